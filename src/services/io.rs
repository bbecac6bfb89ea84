//! Image ingestion and file I/O service
//!
//! Keeps upload validation, decoding and file access out of the rendering
//! code so the pipeline only ever sees decoded RGBA images.

use crate::{
    error::{CompositeError, Result},
    export::output_filename,
};
use image::{ImageFormat, RgbaImage};
use std::{path::Path, sync::Arc};

/// Largest accepted upload (5 MiB)
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// A validated, still encoded upload
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name, if the client sent one
    pub name: Option<String>,
    pub bytes: Arc<[u8]>,
    /// Format detected from the content, not the name
    pub format: ImageFormat,
}

impl Upload {
    /// Suggested download name for results derived from this upload
    #[must_use]
    pub fn output_name(&self) -> String {
        output_filename(self.name.as_deref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Service for validating uploads and reading images
pub struct ImageIOService;

impl ImageIOService {
    /// Check size and content type of an upload
    ///
    /// # Errors
    /// - `InputTooLarge` above [`MAX_UPLOAD_BYTES`]
    /// - `UnsupportedFormat` when the content is not a decodable image
    pub fn validate_upload(bytes: &[u8]) -> Result<ImageFormat> {
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(CompositeError::input_too_large(format!(
                "upload is {} bytes, limit is {} bytes",
                bytes.len(),
                MAX_UPLOAD_BYTES
            )));
        }

        let format = image::guess_format(bytes).map_err(|_| {
            CompositeError::unsupported_format("upload is not a recognised image")
        })?;

        if !format.reading_enabled() {
            return Err(CompositeError::unsupported_format(format!(
                "{:?} images are not supported",
                format
            )));
        }

        Ok(format)
    }

    /// Validate an upload and keep it for later decoding
    ///
    /// # Examples
    /// ```rust
    /// use imgly_bgcompose::services::ImageIOService;
    ///
    /// let err = ImageIOService::ingest(Some("notes.txt"), b"hello".to_vec());
    /// assert!(err.is_err());
    /// ```
    pub fn ingest(name: Option<&str>, bytes: Vec<u8>) -> Result<Upload> {
        let format = Self::validate_upload(&bytes)?;
        log::debug!(
            "Accepted {:?} upload {} ({} bytes)",
            format,
            name.unwrap_or("<unnamed>"),
            bytes.len()
        );

        Ok(Upload {
            name: name.map(ToString::to_string),
            bytes: bytes.into(),
            format,
        })
    }

    /// Decode encoded image bytes into RGBA
    pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
        let image = image::load_from_memory(bytes)?;
        Ok(image.to_rgba8())
    }

    /// Load an image from a file path
    ///
    /// Falls back to content-based detection when the extension is wrong.
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(CompositeError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(image) => Ok(image.to_rgba8()),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref)
                    .map_err(|io_err| CompositeError::file_io_error("read image data", path_ref, &io_err))?;
                Self::decode(&data).map_err(|content_err| {
                    CompositeError::unsupported_format(format!(
                        "{} could not be decoded ({} bytes): {}",
                        path_ref.display(),
                        data.len(),
                        content_err
                    ))
                })
            },
        }
    }

    /// Read a file and validate it like a browser upload
    pub fn load_upload<P: AsRef<Path>>(path: P) -> Result<Upload> {
        let path_ref = path.as_ref();
        let bytes = std::fs::read(path_ref)
            .map_err(|e| CompositeError::file_io_error("read upload", path_ref, &e))?;
        let name = path_ref.file_name().and_then(|n| n.to_str());
        Self::ingest(name, bytes)
    }
}
