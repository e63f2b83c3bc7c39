//! Error types
//!
//! Registration-time failures. Dispatch-time failures are logged and skipped
//! where they happen, so they never surface here.

use thiserror::Error;

use crate::id::Id;

/// Errors from building or populating a collision space
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollisionError {
    #[error("grid must have at least one chunk on each axis (got {x_len}x{y_len})")]
    EmptyGrid { x_len: usize, y_len: usize },

    #[error("chunk size must be positive (got {x}x{y})")]
    InvalidChunkSize { x: i32, y: i32 },

    /// A toroidal axis needs distinct previous/next neighbours
    #[error("toroidal axis {axis} needs at least 3 chunks (got {len})")]
    WrapGridTooSmall { axis: char, len: usize },

    #[error("id 0 is reserved and cannot name a collision object or actor")]
    ReservedId,

    #[error("id {0} is already registered as an object or actor")]
    DuplicateId(Id),

    #[error("canvas element is missing or its block is gone")]
    MissingElement,
}

/// Errors from wiring the dispatch graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("connection origin {0} is not a registered block or group")]
    InvalidOrigin(Id),

    #[error("connection destination {0} is not a registered block, group, SELF or MANAGER")]
    InvalidDestination(Id),

    #[error("RunFunc connection to the manager has no function bound")]
    MissingFunction,

    #[error("{0} is not a registered block")]
    UnknownBlock(Id),

    #[error("{0} is not a registered group")]
    UnknownGroup(Id),
}

/// Errors from level templates and generation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("unknown level element {0}")]
    UnknownElement(usize),

    #[error("unknown level template {0}")]
    UnknownTemplate(usize),

    #[error("level template cells must have a positive size (got {w}x{h})")]
    InvalidCellSize { w: i32, h: i32 },

    #[error("block {0} is not part of the generated level")]
    UnknownBlock(Id),

    #[error("generated block could not be registered")]
    Unregistered,

    /// The canvas or collision space is mid-update
    #[error("{0} is busy")]
    Busy(&'static str),

    #[error("failed to parse level data: {0}")]
    Parse(String),
}

/// Errors from loading settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse settings: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for LevelError {
    fn from(e: serde_json::Error) -> Self {
        LevelError::Parse(e.to_string())
    }
}
