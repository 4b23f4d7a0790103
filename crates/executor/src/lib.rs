#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Executor
//!
//! The boundary between the orchestration engine and the systems that do the
//! actual work.
//!
//! An [`Executor`] starts one unit of work from an [`ExecutionRequest`] and
//! returns a [`Resource`] handle. Synchronous work is final immediately
//! ([`SyncResource`], judged by an [`OutcomePredicate`]); asynchronous work
//! exposes a correlation id and is finished only by later
//! [`Executor::async_check`] calls, which need nothing but that id.
//!
//! Executors register in an [`ExecutorRegistry`] under component keys and
//! receive a time-boxed HS256 callback token from a [`TokenSigner`] with
//! every request.

mod error;
mod executor;
mod registry;
mod resource;
mod status;
mod token;

pub use error::ExecutorError;
pub use executor::{ExecutionRequest, Executor};
pub use registry::ExecutorRegistry;
pub use resource::{OutcomePredicate, Resource, SyncResource};
pub use status::CheckStatus;
pub use token::{CallbackClaims, TokenSigner};
