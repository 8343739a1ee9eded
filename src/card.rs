//! Card classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The classification of an RFID card as returned by the backend.
///
/// `Invalid` is the default when no card is present or the reader/backend
/// returned no usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    Invalid,
    ShutdownCard,
    ProxyCard,
    UserCard,
    TrainingCard,
}

impl Default for CardType {
    fn default() -> Self {
        Self::Invalid
    }
}

impl CardType {
    /// Decode the backend's integer card-type code.
    ///
    /// A `None` (backend sent `null`) is treated as `-1` per spec, which
    /// falls through to `Invalid` below.
    pub fn from_backend_code(code: Option<i64>) -> Self {
        match code.unwrap_or(-1) {
            0 => Self::ShutdownCard,
            1 => Self::ProxyCard,
            2 => Self::UserCard,
            3 => Self::TrainingCard,
            _ => Self::Invalid,
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Invalid => "invalid",
            Self::ShutdownCard => "shutdown",
            Self::ProxyCard => "proxy",
            Self::UserCard => "user",
            Self::TrainingCard => "training",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[path = "card_tests.rs"]
mod tests;
