//! Typed identifiers for sessions, transactions, and traces

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a strongly-typed uuid newtype so ids of different kinds
/// cannot be mixed up at compile time.
macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident, $entity:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Entity name used in error messages.
            pub const ENTITY_NAME: &'static str = $entity;

            /// Wrap an existing uuid.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Timestamp-sortable UUIDv7 id.
            pub fn now_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Random UUIDv4 id.
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Nil (all zeros) id.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// The underlying uuid.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name).map_err(|source| IdParseError {
                    entity_name: $entity,
                    input: s.to_string(),
                    source,
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

typed_id!(
    /// Identifier for an engine execution session.
    SessionId,
    "session"
);

typed_id!(
    /// Identifier for a transaction in the transaction manager.
    TransactionId,
    "transaction"
);

typed_id!(
    /// Per-execution trace identifier for log correlation.
    TraceId,
    "trace"
);

/// Error when parsing a typed id from a string.
#[derive(Debug, Clone)]
pub struct IdParseError {
    pub entity_name: &'static str,
    pub input: String,
    pub source: uuid::Error,
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse {} id from '{}': {}",
            self.entity_name, self.input, self.source
        )
    }
}

impl std::error::Error for IdParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_through_string() {
        let id = TransactionId::now_v7();
        let parsed: TransactionId = id.to_string().parse().expect("roundtrip should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_distinct_types() {
        let session = SessionId::now_v7();
        let trace = TraceId::new(session.as_uuid());
        // Same uuid, different types; comparing uuids is the only bridge.
        assert_eq!(session.as_uuid(), trace.as_uuid());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<SessionId>().unwrap_err();
        assert_eq!(err.entity_name, "session");
    }
}
