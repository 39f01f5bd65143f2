//! Error types for the engine.

use thiserror::Error;

use crate::coords::{ColumnPos, WorldPos};

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A block type identifier was registered twice
    #[error("Duplicate block type: {0}")]
    DuplicateId(String),

    /// Generator wrote outside its own column before population
    #[error(
        "Column ({}, {}) wrote block ({}, {}, {}) outside its footprint before population",
        column.x, column.y, target.x, target.y, target.z
    )]
    BoundaryViolation {
        /// Column being generated
        column: ColumnPos,
        /// Block the write targeted
        target: WorldPos,
    },

    /// Persisted column bytes could not be decoded
    #[error("Corrupt column data: {0}")]
    CorruptColumnData(String),

    /// Out of bounds access
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
