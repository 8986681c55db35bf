use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CropError>;

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Unsupported image reference: {0}")]
    UnsupportedReference(String),

    #[error("Malformed data URI: {0}")]
    InvalidDataUri(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Crop region is empty ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Widget was dropped before the operation finished")]
    Cancelled,

    #[error("Widget has no image loaded")]
    NotReady,
}
