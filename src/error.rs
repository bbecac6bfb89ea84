//! Error types for compositing operations

use thiserror::Error;

/// Result type alias for compositing operations
pub type Result<T> = std::result::Result<T, CompositeError>;

/// Error taxonomy for the compositing core
///
/// Every variant is fatal to the render attempt that produced it. The pipeline
/// itself stays usable and nothing is retried internally.
#[derive(Error, Debug)]
pub enum CompositeError {
    /// Original and foreground images differ in size
    #[error("Input mismatch: {0}")]
    InputMismatch(String),

    /// Surface dimensions are invalid or exceed the configured memory bound
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// No drawing surface could be checked out for a stage
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// The background-removal collaborator reported a failure
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// The final surface could not be serialized
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Upload is not a supported image
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Upload exceeds the ingestion size ceiling
    #[error("Input too large: {0}")]
    InputTooLarge(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors from the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl CompositeError {
    /// Create a new input mismatch error
    pub fn input_mismatch<S: Into<String>>(msg: S) -> Self {
        Self::InputMismatch(msg.into())
    }

    /// Create a new allocation error
    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Self::Allocation(msg.into())
    }

    /// Create a new surface unavailable error
    pub fn surface_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SurfaceUnavailable(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new input too large error
    pub fn input_too_large<S: Into<String>>(msg: S) -> Self {
        Self::InputTooLarge(msg.into())
    }

    /// Create a mismatch error describing both image sizes
    #[must_use]
    pub fn dimension_mismatch(original: (u32, u32), foreground: (u32, u32)) -> Self {
        Self::InputMismatch(format!(
            "original is {}x{} but foreground is {}x{}",
            original.0, original.1, foreground.0, foreground.1
        ))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether the caller may retry the same request on the next interaction
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SurfaceUnavailable(_) | Self::Segmentation(_))
    }
}
