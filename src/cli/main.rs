//! Compositing CLI tool
//!
//! Renders an original photo and its background-removed foreground into a
//! single PNG with the selected effects.

use super::{config::CliConfigBuilder, progress::ProgressBarReporter};
use crate::{
    config::{EffectConfig, PipelineConfig},
    pipeline::CompositePipeline,
    services::{ImageIOService, ProgressTracker},
    tracing_config::{init_cli_tracing, spans},
    types::RenderTimings,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::RgbaImage;
use instant::Instant;
use log::info;
use std::path::{Path, PathBuf};
use tracing::{debug, Instrument};

/// Background compositing CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-bgcompose")]
pub struct Cli {
    /// The unmodified photo
    #[arg(long, value_name = "FILE")]
    pub original: PathBuf,

    /// The background-removed foreground, same size as the original
    #[arg(long, value_name = "FILE")]
    pub foreground: PathBuf,

    /// Output PNG file (default: <original>_removebg.png next to the original)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// JSON effect file; flags below override its values
    #[arg(long, value_name = "FILE.json")]
    pub effects: Option<PathBuf>,

    /// What to paint behind the subject
    #[arg(long, value_enum)]
    pub background: Option<CliBackground>,

    /// Fill colour as #rgb, #rrggbb or #rrggbbaa
    #[arg(long, value_name = "HEX")]
    pub background_color: Option<String>,

    /// Blur the background with this radius in pixels
    #[arg(long, value_name = "RADIUS")]
    pub blur: Option<u32>,

    /// Desaturate the background
    #[arg(long)]
    pub grayscale: bool,

    /// Outline the subject; the stroke is size/8 pixels wide
    #[arg(long, value_name = "PX")]
    pub border_size: Option<u32>,

    /// Outline colour as #rgb, #rrggbb or #rrggbbaa
    #[arg(long, value_name = "HEX")]
    pub border_color: Option<String>,

    /// Largest surface the pipeline may allocate, in megapixels
    #[arg(long, value_name = "N")]
    pub max_megapixels: Option<f64>,

    /// Show a progress bar while rendering
    #[arg(long)]
    pub progress: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Background modes accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CliBackground {
    /// Checkerboard transparency indicator
    Transparent,
    /// Solid colour fill (see --background-color)
    Color,
    /// The original photo
    Original,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let effects = CliConfigBuilder::effects_from_cli(&cli).context("Failed to build effects")?;
    let pipeline_config =
        CliConfigBuilder::pipeline_from_cli(&cli).context("Failed to build configuration")?;

    info!("Starting compositing CLI");
    info!("Effects: {}", describe_effects(&effects));

    let span = spans::composite(&cli.original, &cli.foreground);
    composite(&cli, pipeline_config, &effects)
        .instrument(span)
        .await
}

async fn composite(
    cli: &Cli,
    pipeline_config: PipelineConfig,
    effects: &EffectConfig,
) -> Result<()> {
    let start_time = Instant::now();
    let mut pipeline =
        CompositePipeline::new(pipeline_config).context("Failed to create compositing pipeline")?;
    if cli.progress {
        pipeline.set_progress_tracker(Some(ProgressTracker::new(Box::new(
            ProgressBarReporter::new(),
        ))));
    }

    pipeline.report_loading();
    let (original, foreground) = load_pair(cli.original.clone(), cli.foreground.clone()).await?;
    let source_name = cli.original.file_name().and_then(|n| n.to_str());
    let artifact = pipeline
        .render_named(&original, &foreground, effects, source_name)
        .context("Failed to composite images")?;

    let output_path = CliConfigBuilder::resolve_output_path(cli);
    artifact
        .save(&output_path)
        .with_context(|| format!("Failed to save {}", output_path.display()))?;

    log_breakdown(&cli.original, &artifact.metadata().timings);
    info!(
        "Wrote {} ({}x{}) in {:.2}s",
        output_path.display(),
        artifact.width(),
        artifact.height(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Decode both inputs off the async runtime
async fn load_pair(original: PathBuf, foreground: PathBuf) -> Result<(RgbaImage, RgbaImage)> {
    tokio::task::spawn_blocking(move || {
        let original_image = load_input(&original, "original")?;
        let foreground_image = load_input(&foreground, "foreground")?;
        Ok((original_image, foreground_image))
    })
    .await
    .context("Image loading task failed")?
}

fn load_input(path: &Path, role: &str) -> Result<RgbaImage> {
    let _span = spans::file_loading(path).entered();
    let image = ImageIOService::load_image(path)
        .with_context(|| format!("Failed to load {} image {}", role, path.display()))?;
    debug!(
        role,
        width = image.width(),
        height = image.height(),
        "Loaded input image"
    );
    Ok(image)
}

fn describe_effects(effects: &EffectConfig) -> String {
    let enabled = effects.enabled_effects();
    if enabled.is_empty() {
        "none".to_string()
    } else {
        enabled.join(", ")
    }
}

fn log_breakdown(input: &Path, timings: &RenderTimings) {
    let breakdown = timings.breakdown_percentages();

    info!("📊 Render breakdown for {}:", input.display());
    info!(
        "  ├─ Setup: {}ms ({:.1}%)",
        timings.setup_ms, breakdown.setup_pct
    );
    info!(
        "  ├─ Background: {}ms ({:.1}%)",
        timings.background_ms, breakdown.background_pct
    );
    if timings.blur_ms > 0 {
        info!(
            "  ├─ Blur: {}ms ({:.1}%)",
            timings.blur_ms, breakdown.blur_pct
        );
    }
    if timings.grayscale_ms > 0 {
        info!(
            "  ├─ Grayscale: {}ms ({:.1}%)",
            timings.grayscale_ms, breakdown.grayscale_pct
        );
    }
    info!(
        "  ├─ Foreground: {}ms ({:.1}%)",
        timings.foreground_ms, breakdown.foreground_pct
    );
    if timings.border_ms > 0 {
        info!(
            "  ├─ Border: {}ms ({:.1}%)",
            timings.border_ms, breakdown.border_pct
        );
    }
    if let Some(encode_ms) = timings.encode_ms {
        info!(
            "  ├─ Encode: {}ms ({:.1}%)",
            encode_ms, breakdown.encode_pct
        );
    }
    info!(
        "  └─ Total: {}ms ({:.2}s)",
        timings.total_ms,
        timings.total_ms as f64 / 1000.0
    );
}
