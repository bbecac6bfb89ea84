#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Background Compositing Library
//!
//! The rendering core of a background-removal photo editor. Given the
//! original photo and its background-removed foreground, it composites the
//! two with a set of user-selected effects and encodes the result as PNG.
//!
//! ## Features
//!
//! - **Background modes**: checkerboard transparency, solid colour fill or
//!   the original photo
//! - **Background effects**: Gaussian blur and grayscale applied behind the
//!   subject only
//! - **Subject outline**: a coloured border built by dilating the
//!   foreground silhouette
//! - **Bounded memory**: surfaces come from a capacity-limited pool with a
//!   megapixel allocation limit
//! - **Artifact lifecycle**: each render supersedes and releases the
//!   previous output
//! - **Sessions**: async segmentation with progress, cancellation and
//!   last-request-wins rendering
//! - **CLI Integration**: optional command-line interface (enable with `cli`
//!   feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_bgcompose::{
//!     config::{Color, EffectConfig, PipelineConfig},
//!     CompositePipeline, ImageIOService,
//! };
//!
//! # fn example() -> anyhow::Result<()> {
//! let original = ImageIOService::load_image("portrait.jpg")?;
//! let foreground = ImageIOService::load_image("portrait_foreground.png")?;
//!
//! let effects = EffectConfig::builder()
//!     .background_color(Color::from_hex("#1e293b")?)
//!     .border(Color::WHITE, 40)
//!     .build()?;
//!
//! let mut pipeline = CompositePipeline::new(PipelineConfig::default())?;
//! let artifact = pipeline.render_named(&original, &foreground, &effects, Some("portrait.jpg"))?;
//! artifact.save(artifact.file_name())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! - **Library Usage**: compositing, sessions and export are available by
//!   default
//! - **CLI Usage**: the `cli` feature adds the `imgly-bgcompose` binary and
//!   tracing subscriber setup
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface and tracing output
//! - `webp-support` (default): WebP decoding for uploads
//! - `tracing-json`: JSON log output for the CLI
//!
//! ```toml
//! [dependencies]
//! imgly-bgcompose = { version = "0.1", default-features = false }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod effects;
pub mod error;
pub mod export;
pub mod mask;
pub mod pipeline;
pub mod pool;
pub mod segmentation;
pub mod services;
pub mod session;
pub mod surface;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

pub use config::{
    BackgroundEffect, BlurEffect, BorderEffect, CheckerboardStyle, Color, EffectConfig,
    GrayscaleEffect, PipelineConfig, SurfaceLimits,
};
pub use effects::{EffectStage, StageKind};
pub use error::{CompositeError, Result};
pub use export::{output_filename, ArtifactHandle, ArtifactStore, OutputArtifact};
pub use mask::{Mask, MaskBuilder};
pub use pipeline::CompositePipeline;
pub use pool::SurfacePool;
pub use segmentation::{
    GuidanceMask, SegmentationBackend, SegmentationEvent, SegmentationJob, SegmentationProgress,
    SegmentationRequest,
};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate, Upload,
};
pub use session::{EditSession, ProcessingState, RenderOutcome};
pub use surface::{CompositeMode, RasterSurface};
pub use types::{RenderMetadata, RenderTimings, TimingBreakdown};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Composite encoded image bytes with the given effects
///
/// Decodes both inputs, renders them on a fresh pipeline with default
/// limits and returns the encoded artifact.
///
/// # Arguments
///
/// * `original_bytes` - The unmodified photo in any supported format
/// * `foreground_bytes` - The background-removed foreground, same size
/// * `effects` - Effects to apply
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_bgcompose::{composite_from_bytes, EffectConfig};
///
/// # async fn example(original: Vec<u8>, foreground: Vec<u8>) -> anyhow::Result<()> {
/// let effects = EffectConfig::default().with_grayscale(true);
/// let artifact = composite_from_bytes(&original, &foreground, &effects).await?;
/// std::fs::write("out.png", artifact.bytes())?;
/// # Ok(())
/// # }
/// ```
pub async fn composite_from_bytes(
    original_bytes: &[u8],
    foreground_bytes: &[u8],
    effects: &EffectConfig,
) -> Result<OutputArtifact> {
    let original = ImageIOService::decode(original_bytes)?;
    let foreground = ImageIOService::decode(foreground_bytes)?;

    composite_images(&original, &foreground, effects)
}

/// Composite already decoded images with the given effects
pub fn composite_images(
    original: &image::RgbaImage,
    foreground: &image::RgbaImage,
    effects: &EffectConfig,
) -> Result<OutputArtifact> {
    let mut pipeline = CompositePipeline::new(PipelineConfig::default())?;
    pipeline.render(original, foreground, effects)
}
