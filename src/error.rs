/// Error taxonomy shared by the catalog, the track graph and the GPU layer
///
/// Every core operation returns these as results to its direct caller.
/// Attach conflicts are NOT errors: they come back as
/// `AttachOutcome::Conflict` and leave the graph untouched.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    /// Invalid image, keypoint or track id
    #[error("{0} not found")]
    NotFound(String),

    /// Data that collides with what is already stored (e.g. a re-imported image id)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Inconsistent track data; the operation was rolled back completely
    #[error("corrupted track data: {0}")]
    Corruption(String),

    /// A fixed capacity bound would be exceeded
    #[error("capacity exceeded: {what} (limit {limit})")]
    CapacityExceeded { what: &'static str, limit: usize },

    /// The reconstruction files could not be read or parsed
    #[error("import failed: {0}")]
    Import(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}

impl EditorError {
    pub(crate) fn image_not_found(image_id: impl std::fmt::Display) -> Self {
        EditorError::NotFound(format!("image {}", image_id))
    }

    pub(crate) fn keypoint_not_found(
        image_id: impl std::fmt::Display,
        keypoint_id: impl std::fmt::Display,
    ) -> Self {
        EditorError::NotFound(format!("keypoint {} of image {}", keypoint_id, image_id))
    }

    pub(crate) fn track_not_found(track_id: impl std::fmt::Display) -> Self {
        EditorError::NotFound(format!("track {}", track_id))
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;
