//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliBackground};
use crate::{
    config::{BackgroundEffect, BlurEffect, BorderEffect, Color, EffectConfig, PipelineConfig},
    export::output_filename,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Convert CLI arguments to pipeline and effect configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the effect selection: the JSON file first, then flag overrides
    pub(crate) fn effects_from_cli(cli: &Cli) -> Result<EffectConfig> {
        let mut effects = match &cli.effects {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read effect file {}", path.display()))?;
                EffectConfig::from_json(&json)
                    .with_context(|| format!("Invalid effect file {}", path.display()))?
            },
            None => EffectConfig::default(),
        };

        let background_color = cli
            .background_color
            .as_deref()
            .map(Color::from_hex)
            .transpose()
            .context("Invalid --background-color")?;

        // A colour without an explicit mode selects a solid fill
        let mode = cli
            .background
            .or(background_color.map(|_| CliBackground::Color));
        if let Some(mode) = mode {
            let color = background_color
                .or(match effects.background {
                    BackgroundEffect::Fill(color) => Some(color),
                    _ => None,
                })
                .unwrap_or_default();
            let background = match mode {
                CliBackground::Transparent => BackgroundEffect::Transparent,
                CliBackground::Color => BackgroundEffect::Fill(color),
                CliBackground::Original => BackgroundEffect::Original,
            };
            effects = effects.with_background(background);
        }

        if let Some(radius_px) = cli.blur {
            effects = effects.with_blur(BlurEffect {
                enabled: true,
                radius_px,
            });
        }

        if cli.grayscale {
            effects = effects.with_grayscale(true);
        }

        if cli.border_size.is_some() || cli.border_color.is_some() {
            let color = match cli.border_color.as_deref() {
                Some(hex) => Color::from_hex(hex).context("Invalid --border-color")?,
                None => effects.border.color,
            };
            effects = effects.with_border(BorderEffect {
                enabled: true,
                color,
                size_px: cli.border_size.unwrap_or(effects.border.size_px),
            });
        }

        effects.validate().context("Invalid effect combination")?;
        Ok(effects)
    }

    /// Build the pipeline configuration
    pub(crate) fn pipeline_from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder().verbose_progress(cli.verbose >= 1);
        if let Some(max_megapixels) = cli.max_megapixels {
            builder = builder.max_megapixels(max_megapixels);
        }
        builder.build().context("Invalid pipeline configuration")
    }

    /// Reject argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.original == cli.foreground {
            anyhow::bail!("--original and --foreground must be different files");
        }

        if let Some(output) = &cli.output {
            if output.is_dir() {
                anyhow::bail!(
                    "Output {} is a directory; pass a file path",
                    output.display()
                );
            }
        }

        if cli.background_color.is_some()
            && matches!(
                cli.background,
                Some(CliBackground::Transparent | CliBackground::Original)
            )
        {
            anyhow::bail!("--background-color only applies to --background color");
        }

        Ok(())
    }

    /// Where the result is written when `-o` is absent: next to the original
    pub(crate) fn resolve_output_path(cli: &Cli) -> PathBuf {
        if let Some(output) = &cli.output {
            return output.clone();
        }

        let name = cli.original.file_name().and_then(|n| n.to_str());
        let file_name = output_filename(name);
        match cli.original.parent() {
            Some(parent) if parent != Path::new("") => parent.join(file_name),
            _ => PathBuf::from(file_name),
        }
    }
}
