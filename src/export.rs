//! PNG serialisation and artifact lifetime management
//!
//! Every successful render produces an [`OutputArtifact`]. The pipeline keeps
//! the encoded bytes in an [`ArtifactStore`] under an [`ArtifactHandle`] and
//! releases the previous artifact when a new one supersedes it, so a long
//! editing session holds at most one live result.

use crate::{
    error::{CompositeError, Result},
    types::RenderMetadata,
};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, path::Path, sync::Arc};

/// Suffix appended to the original file stem for downloads
pub const OUTPUT_SUFFIX: &str = "_removebg";

/// File name used when the upload had no usable name
pub const DEFAULT_OUTPUT_NAME: &str = "image_removebg.png";

/// Losslessly encode an RGBA image as PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| {
            CompositeError::encoding(format!(
                "PNG encoding of {}x{} image failed: {}",
                image.width(),
                image.height(),
                e
            ))
        })?;
    Ok(buffer)
}

/// Decode PNG bytes back into an RGBA image
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    Ok(image.to_rgba8())
}

/// Download name for a result: `<stem>_removebg.png`
///
/// ```rust
/// use imgly_bgcompose::export::output_filename;
///
/// assert_eq!(output_filename(Some("holiday.jpg")), "holiday_removebg.png");
/// assert_eq!(output_filename(None), "image_removebg.png");
/// ```
#[must_use]
pub fn output_filename(original_name: Option<&str>) -> String {
    original_name
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map_or_else(
            || DEFAULT_OUTPUT_NAME.to_string(),
            |stem| format!("{}{}.png", stem, OUTPUT_SUFFIX),
        )
}

/// Opaque reference to a registered artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactHandle(u64);

impl ArtifactHandle {
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "artifact-{}", self.0)
    }
}

/// Registry of live artifact payloads
#[derive(Debug, Default)]
pub struct ArtifactStore {
    next_id: u64,
    entries: HashMap<ArtifactHandle, Arc<[u8]>>,
    current: Option<ArtifactHandle>,
}

impl ArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload under a fresh handle
    pub fn register(&mut self, bytes: Arc<[u8]>) -> ArtifactHandle {
        self.next_id += 1;
        let handle = ArtifactHandle(self.next_id);
        self.entries.insert(handle, bytes);
        handle
    }

    /// Register a payload as the current result and release the previous one
    pub fn replace_current(&mut self, bytes: Arc<[u8]>) -> ArtifactHandle {
        let handle = self.register(bytes);
        if let Some(previous) = self.current.replace(handle) {
            self.release(previous);
        }
        handle
    }

    #[must_use]
    pub fn get(&self, handle: ArtifactHandle) -> Option<Arc<[u8]>> {
        self.entries.get(&handle).cloned()
    }

    /// Release a handle; returns whether it was still live
    pub fn release(&mut self, handle: ArtifactHandle) -> bool {
        if self.current == Some(handle) {
            self.current = None;
        }
        self.entries.remove(&handle).is_some()
    }

    #[must_use]
    pub fn current(&self) -> Option<ArtifactHandle> {
        self.current
    }

    #[must_use]
    pub fn is_live(&self, handle: ArtifactHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of artifacts not yet released
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }
}

/// Encoded result of one render
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    handle: ArtifactHandle,
    bytes: Arc<[u8]>,
    file_name: String,
    metadata: RenderMetadata,
}

impl OutputArtifact {
    #[must_use]
    pub fn new(
        handle: ArtifactHandle,
        bytes: Arc<[u8]>,
        file_name: String,
        metadata: RenderMetadata,
    ) -> Self {
        Self {
            handle,
            bytes,
            file_name,
            metadata,
        }
    }

    #[must_use]
    pub fn handle(&self) -> ArtifactHandle {
        self.handle
    }

    /// PNG-encoded bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.metadata.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.metadata.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.metadata.width, self.metadata.height)
    }

    /// Suggested download name
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn metadata(&self) -> &RenderMetadata {
        &self.metadata
    }

    /// Replace the suggested download name
    #[must_use]
    pub fn with_file_name<S: Into<String>>(mut self, file_name: S) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Decode the PNG payload
    pub fn decode(&self) -> Result<RgbaImage> {
        decode_png(&self.bytes)
    }

    /// Write the PNG to `path`, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CompositeError::file_io_error("create output directory", parent, &e))?;
        }

        std::fs::write(path, &self.bytes)
            .map_err(|e| CompositeError::file_io_error("write artifact", path, &e))?;

        log::debug!(
            "Saved {} ({} bytes) to {}",
            self.handle,
            self.bytes.len(),
            path.display()
        );
        Ok(())
    }

    /// Write the PNG into `dir` under its suggested file name
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<std::path::PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        self.save(&path)?;
        Ok(path)
    }
}
