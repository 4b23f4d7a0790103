#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Engine
//!
//! The orchestration layer that ties the rest of the workspace together:
//!
//! - [`StateMachine`] — applies execution and node lifecycle transitions,
//!   with failure cascades up parent chains and cancellation down them.
//! - [`ConfigResolver`] — two-phase configuration resolution: a persistable
//!   build pass that defers secret-bearing expressions, and an ephemeral
//!   runtime pass that binds them just before dispatch.
//! - [`Router`] — fans pending events out along workflow edges, handing
//!   grouped fan-in targets to the join aggregator.
//! - [`Engine`] — the step itself: claim, resolve, execute, settle; plus
//!   polling of asynchronous work and the field-set timeout sweep.
//! - [`Worker`] — a cancellable loop running those passes over one store.
//!
//! Everything here is store-generic: any number of engines and workers can
//! run over the same [`sirocco_store::Store`] concurrently.

mod config;
mod engine;
mod error;
mod machine;
mod notify;
mod resolve;
mod router;
mod worker;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use machine::StateMachine;
pub use notify::{Notifier, TracingNotifier};
pub use resolve::{ConfigResolver, ResolvedConfiguration, SECRETS_FUNCTION};
pub use router::Router;
pub use worker::Worker;
