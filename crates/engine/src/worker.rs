//! The worker loop driving an engine.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use sirocco_store::Store;

use crate::engine::Engine;

/// Drives one engine in a loop: route, step, poll, and periodically sweep.
///
/// Passes run in that order so a freshly routed event can be claimed in the
/// same tick. A tick that moves nothing sleeps for the configured idle
/// backoff. Any number of workers may run over engines sharing one store.
pub struct Worker<S> {
    engine: Engine<S>,
    cancel: CancellationToken,
}

impl<S> Worker<S> {
    /// Creates a worker over `engine` with a fresh cancellation token.
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine,
            cancel: CancellationToken::new(),
        }
    }

    /// A handle that stops the loop when cancelled.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<S: Store> Worker<S> {
    /// Runs until the token is cancelled.
    ///
    /// Store-level errors from a pass are logged and the loop keeps going;
    /// the next tick retries from stored state.
    pub async fn run(self) {
        let idle_backoff = self.engine.config().idle_backoff;
        let sweep_interval = self.engine.config().sweep_interval;
        let mut last_sweep = Instant::now();
        tracing::info!("worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut busy = false;

            match self.engine.route().await {
                Ok(routed) => busy |= routed > 0,
                Err(err) => tracing::error!(error = %err, "routing pass failed"),
            }
            match self.engine.step().await {
                Ok(claimed) => busy |= claimed,
                Err(err) => tracing::error!(error = %err, "orchestration step failed"),
            }
            match self.engine.poll_due().await {
                Ok(settled) => busy |= settled > 0,
                Err(err) => tracing::error!(error = %err, "poll pass failed"),
            }

            if last_sweep.elapsed() >= sweep_interval {
                last_sweep = Instant::now();
                match self.engine.sweep().await {
                    Ok(emitted) => busy |= emitted > 0,
                    Err(err) => tracing::error!(error = %err, "sweep pass failed"),
                }
            }

            if !busy {
                tokio::select! {
                    () = tokio::time::sleep(idle_backoff) => {}
                    () = self.cancel.cancelled() => break,
                }
            }
        }

        tracing::info!("worker stopped");
    }
}
