//! Engine states and log levels shared with the AlpyneServer.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Set of engine states.
///
/// The engine is either waiting for input (IDLE, PAUSED), busy (RUNNING,
/// PLEASE_WAIT), or halted (FINISHED, ERROR). Values combine with `|` so a
/// lock request can wait on several states at once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EngineState(u8);

impl EngineState {
    /// Just started, waiting for the configuration
    pub const IDLE: Self = Self(1);
    /// Mid-run, waiting for action and open to observation and output querying
    pub const PAUSED: Self = Self(1 << 1);
    /// The model is being actively executed
    pub const RUNNING: Self = Self(1 << 2);
    /// The model execution is finished successfully
    pub const FINISHED: Self = Self(1 << 3);
    /// Internal model error
    pub const ERROR: Self = Self(1 << 4);
    /// Executing an uninterruptible command (pause, stop, step)
    pub const PLEASE_WAIT: Self = Self(1 << 5);

    const ALL: [(Self, &'static str); 6] = [
        (Self::IDLE, "IDLE"),
        (Self::PAUSED, "PAUSED"),
        (Self::RUNNING, "RUNNING"),
        (Self::FINISHED, "FINISHED"),
        (Self::ERROR, "ERROR"),
        (Self::PLEASE_WAIT, "PLEASE_WAIT"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every state.
    pub const fn any() -> Self {
        Self(0b11_1111)
    }

    /// States after which the engine accepts no further progress without input.
    pub const fn settled() -> Self {
        Self(Self::PAUSED.0 | Self::FINISHED.0 | Self::ERROR.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        !other.is_empty() && self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Parse a single state name; unknown names give the empty set.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(state, _)| *state)
            .unwrap_or_default()
    }

    /// Names of the states in this set, in declaration order.
    pub fn names(self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|(state, _)| self.contains(*state))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for EngineState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for EngineState {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EngineState {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::any().0)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

impl fmt::Debug for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineState({})", self)
    }
}

impl Serialize for EngineState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EngineState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw
            .split('|')
            .map(|name| Self::from_name(name.trim()))
            .fold(Self::empty(), |acc, state| acc | state))
    }
}

/// Log level for the Java server (written to its own log files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum JavaLogLevel {
    Severe,
    Warning,
    #[default]
    Info,
    Config,
    Fine,
    Finer,
    Finest,
}

impl JavaLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            JavaLogLevel::Severe => "SEVERE",
            JavaLogLevel::Warning => "WARNING",
            JavaLogLevel::Info => "INFO",
            JavaLogLevel::Config => "CONFIG",
            JavaLogLevel::Fine => "FINE",
            JavaLogLevel::Finer => "FINER",
            JavaLogLevel::Finest => "FINEST",
        }
    }

    pub fn from_str_ci(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "SEVERE" => Some(JavaLogLevel::Severe),
            "WARNING" => Some(JavaLogLevel::Warning),
            "INFO" => Some(JavaLogLevel::Info),
            "CONFIG" => Some(JavaLogLevel::Config),
            "FINE" => Some(JavaLogLevel::Fine),
            "FINER" => Some(JavaLogLevel::Finer),
            "FINEST" => Some(JavaLogLevel::Finest),
            _ => None,
        }
    }
}

impl fmt::Display for JavaLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
