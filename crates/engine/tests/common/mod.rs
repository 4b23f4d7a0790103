//! Shared fixtures for the engine integration tests.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use parking_lot::Mutex;
use sirocco_credential::{MemorySecretProvider, SecretProvider};
use sirocco_engine::{Engine, EngineConfig};
use sirocco_executor::{
    CheckStatus, ExecutionRequest, Executor, ExecutorError, ExecutorRegistry, Resource,
    SyncResource,
};
use sirocco_store::MemoryStore;

/// Installs a compact per-binary test subscriber. `RUST_LOG` controls
/// verbosity; silent by default.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Synchronous executor double: answers each request with the supplied
/// function and records every request it saw.
pub struct RecordingExecutor {
    behavior: Box<dyn Fn(&ExecutionRequest) -> CheckStatus + Send + Sync>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl RecordingExecutor {
    pub fn new(
        behavior: impl Fn(&ExecutionRequest) -> CheckStatus + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            behavior: Box::new(behavior),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request this executor has received, in arrival order.
    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<Box<dyn Resource>, ExecutorError> {
        let status = (self.behavior)(&request);
        self.requests.lock().push(request);
        Ok(Box::new(SyncResource::new(status)))
    }
}

/// Builds an engine over `store` with the given component bindings.
pub fn engine(
    store: &Arc<MemoryStore>,
    secrets: &Arc<MemorySecretProvider>,
    executors: Vec<(&str, Arc<dyn Executor>)>,
) -> Engine<MemoryStore> {
    init_tracing();
    let mut registry = ExecutorRegistry::new();
    for (component, executor) in executors {
        registry.register(component, executor);
    }
    let provider: Arc<dyn SecretProvider> = Arc::clone(secrets) as _;
    Engine::new(
        Arc::clone(store),
        Arc::new(registry),
        provider,
        EngineConfig::default(),
    )
}

/// Runs route, step, and poll passes until a full pass moves nothing.
/// Deterministic: no sleeping, no background tasks.
pub async fn drain(engine: &Engine<MemoryStore>) {
    loop {
        let mut busy = false;
        busy |= engine.route().await.unwrap() > 0;
        busy |= engine.step().await.unwrap();
        busy |= engine.poll_due().await.unwrap() > 0;
        if !busy {
            break;
        }
    }
}
