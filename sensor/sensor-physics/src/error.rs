//! Error types for the sensor-physics crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in physical model operations.
///
/// Most malformed input is tolerated (logged and replaced with a zero
/// default); only conditions that make an operation meaningless are
/// reported here.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// A snapshot stores more entries than this build knows about.
    ///
    /// This is an I/O-class failure: nothing from the snapshot is applied.
    #[error("incompatible snapshot: stores {stored} {what}, only {supported} supported")]
    IncompatibleSnapshot {
        /// Which table overflowed (`"physical parameters"` or `"sensors"`).
        what: &'static str,
        /// Count found in the stream.
        stored: u32,
        /// Count this build supports.
        supported: u32,
    },

    /// The ground-truth trace file could not be opened.
    #[error("cannot open ground truth file {}: {source}", path.display())]
    GroundTruthOpen {
        /// Resolved path that failed to open.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PhysicsError {
    /// Creates an incompatible snapshot error.
    #[must_use]
    pub const fn incompatible_snapshot(what: &'static str, stored: u32, supported: u32) -> Self {
        Self::IncompatibleSnapshot {
            what,
            stored,
            supported,
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Returns true for errors caused by reading or writing a stream.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleSnapshot { .. } | Self::Io(_) | Self::GroundTruthOpen { .. }
        )
    }
}

/// Result type for physical model operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
