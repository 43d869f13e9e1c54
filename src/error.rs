//! Error types for environment construction and stepping.

use thiserror::Error;

/// Errors raised by the body registry, actuators and environments.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// No body carrying the tag belongs to the requested agent root.
    #[error("no segments tagged `{tag}` found under root {root}")]
    NoSegments {
        /// Tag that was searched for.
        tag: String,
        /// Agent root the segments had to belong to.
        root: u32,
    },

    /// Policy produced an action vector of the wrong length.
    #[error("action length mismatch: expected {expected}, got {actual}")]
    ActionLength {
        /// Length the environment expects.
        expected: usize,
        /// Length that was received.
        actual: usize,
    },

    /// An action component is outside the values its branch accepts.
    #[error("invalid action component {index}: {value}")]
    InvalidAction {
        /// Index of the offending component.
        index: usize,
        /// Received value.
        value: f32,
    },

    /// The backend does not know the body handle.
    #[error("unknown body: {0}")]
    UnknownBody(String),

    /// A segment's position, orientation or velocity is NaN or infinite.
    #[error("non-finite state on segment {segment}")]
    NonFiniteState {
        /// Registry index of the segment.
        segment: usize,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ArenaError {
    /// Creates an action length mismatch error.
    #[must_use]
    pub const fn action_length(expected: usize, actual: usize) -> Self {
        Self::ActionLength { expected, actual }
    }

    /// True for conditions an environment recovers from by resetting.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonFiniteState { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArenaError>;
