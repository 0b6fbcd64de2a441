//! Message severity levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Severity of a log message.
///
/// Levels are ordered from most to least severe, so a message passes the
/// logger when `message_level <= active_level`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Unrecoverable or unexpected failures.
    Error = 1,
    /// Conditions worth attention that do not stop operation.
    Warn = 2,
    /// Normal operational messages.
    #[default]
    Info = 3,
    /// Verbose diagnostics.
    Debug = 4,
}

impl LogLevel {
    /// All levels, most severe first.
    pub const ALL: [Self; 4] = [Self::Error, Self::Warn, Self::Info, Self::Debug];

    /// Lowercase name of the level.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Whether a message at this level passes a logger set to `active`.
    #[must_use]
    pub fn passes(self, active: Self) -> bool {
        self <= active
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(Error::ConfigValidation {
                message: format!("unknown log level: {other}"),
            }),
        }
    }
}
