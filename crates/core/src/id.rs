//! Unique identifiers for sirocco entities.
//!
//! Strongly-typed UUID wrappers, one per entity kind. The newtype pattern
//! gives compile-time safety that prevents mixing different id types; the
//! representation stays a plain `uuid::Uuid`, so ids serialize as UUID
//! strings and cost nothing to copy.

use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an identifier from a string fails.
#[derive(Debug, thiserror::Error)]
#[error("invalid identifier '{input}'")]
pub struct IdParseError {
    input: String,
    #[source]
    source: uuid::Error,
}

impl IdParseError {
    fn new(input: &str, source: uuid::Error) -> Self {
        Self {
            input: input.to_owned(),
            source,
        }
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a random (version 4) identifier.
            #[must_use]
            pub fn v4() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// The zero-valued identifier.
            #[must_use]
            pub const fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Returns `true` if this is the zero-valued identifier.
            #[must_use]
            pub const fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(raw: uuid::Uuid) -> Self {
                Self(raw)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn get(&self) -> uuid::Uuid {
                self.0
            }

            /// Construct from a raw 16-byte array.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(bytes))
            }

            /// The raw 16-byte representation.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Parse an identifier from a UUID string.
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                uuid::Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|source| IdParseError::new(s, source))
            }

            /// The identifier type name, useful as a log field.
            #[must_use]
            pub const fn domain(&self) -> &'static str {
                stringify!($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = IdParseError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(raw: uuid::Uuid) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifies a workflow (one directed graph of nodes and edges).
    WorkflowId
);
define_id!(
    /// Identifies a node within a workflow.
    NodeId
);
define_id!(
    /// Identifies an edge between two nodes.
    EdgeId
);
define_id!(
    /// Identifies an event flowing through the graph.
    EventId
);
define_id!(
    /// Identifies one unit of pending work on a node's queue.
    QueueItemId
);
define_id!(
    /// Identifies one run of a node against one event.
    ExecutionId
);
define_id!(
    /// Identifies a connection group (fan-in join definition).
    ConnectionGroupId
);
define_id!(
    /// Identifies a field set (per-key aggregation record).
    FieldSetId
);
define_id!(
    /// Identifies the organization owning a workflow; scopes secret lookups.
    OrganizationId
);
