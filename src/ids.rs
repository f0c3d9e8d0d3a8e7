//! Strongly typed identifiers shared by the master and the allocator.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a registered framework (scheduler).
    FrameworkId
);

define_id!(
    /// Identifies a registered agent (resource provider).
    AgentId
);

define_id!(
    /// Identifies an outstanding resource offer.
    OfferId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_unique() {
        assert_ne!(FrameworkId::random(), FrameworkId::random());
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = AgentId::from("agent-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"agent-1\"");
        assert_eq!(id.to_string(), "agent-1");
    }
}
