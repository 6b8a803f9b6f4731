//! Opaque string-backed identifiers.
//!
//! Each id wraps the same underlying representation (`String`) but the
//! types are not interchangeable — you cannot pass a `ClientOrderId` where a
//! `ConditionId` is expected. Grounded on `core/domain/execution.rs`'s
//! `OrderId` newtype in the teacher.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(ConditionId);
opaque_id!(MarketTokenId);
opaque_id!(ClientOrderId);
opaque_id!(ExchangeOrderId);
opaque_id!(EthAddress);
