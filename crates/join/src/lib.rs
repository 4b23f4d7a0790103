#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Join
//!
//! Connection-group aggregation: the fan-in half of the engine.
//!
//! Events arriving over a group's named connections are keyed by the group's
//! extraction expressions ([`field_set_hash`]), attached to per-key field
//! sets, and combined into a single outbound event once the group's policy
//! is satisfied — or swept by the timeout behavior if it never is. The
//! [`Aggregator`] drives all of it against a [`sirocco_store::Store`].

mod aggregator;
mod error;
mod key;

pub use aggregator::Aggregator;
pub use error::JoinError;
pub use key::field_set_hash;
