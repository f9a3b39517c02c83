//! Core identifier types for the webhook runner.
//!
//! Identifiers are assigned by the store when a row is inserted, so they are
//! thin wrappers around the row's integer key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered webhook task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

/// Identifier of one recorded execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(i64);

/// Identifier of a dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadLetterId(i64);

macro_rules! integer_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw row key.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying row key.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self::new(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

integer_id!(TaskId);
integer_id!(RunId);
integer_id!(DeadLetterId);
