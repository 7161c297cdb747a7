//! Strongly-typed identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a prefixed, UUID-backed identifier newtype.
///
/// Generates: struct, `new()`, `as_str()`, Default, Display, Serialize,
/// Deserialize, JsonSchema.
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}-{}", $prefix, uuid::Uuid::new_v4()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(TestRunId, "test");
define_id!(ExecutionId, "exec");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_prefixed_and_unique() {
        let a = TestRunId::new();
        let b = TestRunId::new();
        assert!(a.as_str().starts_with("test-"));
        assert_ne!(a, b);
        assert!(ExecutionId::new().to_string().starts_with("exec-"));
    }
}
