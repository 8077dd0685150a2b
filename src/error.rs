//! Error types shared across the recognition pipeline and the profile store

use thiserror::Error;

/// Fatal errors for a single recognition request
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The source image could not be decoded at all
    #[error("failed to decode source image: {0}")]
    Decode(#[from] image::ImageError),
    /// A background task was cancelled or panicked
    #[error("recognition task failed: {0}")]
    Task(String),
}

/// Errors raised by the rendering surface (pixel operations)
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The pixel buffer cannot be processed (empty buffer, zero target size)
    #[error("rendering surface unavailable: {0}")]
    Unavailable(String),
    /// The requested rectangle does not overlap the image
    #[error("region {x},{y} {width}x{height} is outside the {image_width}x{image_height} image")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    /// Encoding the pixel buffer failed
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    /// A geometric transform could not be built
    #[error("invalid transform: {0}")]
    Transform(String),
}

/// Invalid inputs to the hash comparator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("hash lengths differ ({left} vs {right} hex digits)")]
    LengthMismatch { left: usize, right: usize },
    #[error("invalid hex digit {digit:?} in hash")]
    InvalidDigit { digit: char },
    #[error("cannot compare empty hashes")]
    Empty,
}

/// Reasons an exported profile or hash set is rejected on import
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("input is not valid JSON: {0}")]
    NotJson(String),
    #[error("input is not a JSON object")]
    NotAnObject,
    #[error("expected export type {expected:?}, found {found:?}")]
    WrongType { expected: String, found: String },
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// Errors from profile store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("region name {0:?} is used more than once")]
    DuplicateRegionName(String),
    #[error("profile {0:?} does not exist")]
    UnknownProfile(String),
    #[error("invalid hash set: {0}")]
    InvalidHashSet(String),
    #[error("key-value backend failed: {0}")]
    Backend(#[from] anyhow::Error),
    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}
