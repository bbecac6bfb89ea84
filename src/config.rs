//! Configuration types for compositing operations
//!
//! Effect settings are plain values: every `with_*` method consumes the
//! configuration and returns a new one, so a render is fully determined by
//! `(original, foreground, EffectConfig)`.

use crate::error::{CompositeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest accepted blur radius in pixels
pub const MAX_BLUR_RADIUS_PX: u32 = 100;

/// Largest accepted border size in pixels
pub const MAX_BORDER_SIZE_PX: u32 = 400;

/// Straight (non-premultiplied) RGBA8 colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Self = Self::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Opaque colour from its channels
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (the leading `#` is optional)
    ///
    /// # Examples
    /// ```rust
    /// use imgly_bgcompose::config::Color;
    ///
    /// assert_eq!(Color::from_hex("#f5f7fa").unwrap(), Color::rgb(0xf5, 0xf7, 0xfa));
    /// assert_eq!(Color::from_hex("fff").unwrap(), Color::WHITE);
    /// ```
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || CompositeError::invalid_config(format!("Invalid hex colour '{}'", hex));

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(invalid)
        };

        match digits.len() {
            3 => {
                let expand = |i: usize| channel(i..i + 1).map(|v| v * 17);
                Ok(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            },
            6 => Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Ok(Self::rgba(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => Err(invalid()),
        }
    }

    /// Channels as an `image` pixel
    #[must_use]
    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    #[must_use]
    pub fn is_opaque(self) -> bool {
        self.a == 0xff
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Color {
    type Error = CompositeError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// What is painted behind the subject
///
/// Exactly one mode is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "color", rename_all = "lowercase")]
pub enum BackgroundEffect {
    /// Checkerboard transparency indicator
    Transparent,
    /// Solid colour fill
    Fill(Color),
    /// The unmodified original photo
    Original,
}

impl BackgroundEffect {
    /// Resolve the UI toggles into a single mode
    ///
    /// A disabled background always renders as transparent, and
    /// `use_original` wins over a solid colour when both are requested.
    #[must_use]
    pub fn from_toggles(enabled: bool, use_original: bool, color: Color) -> Self {
        match (enabled, use_original) {
            (false, _) => Self::Transparent,
            (true, true) => Self::Original,
            (true, false) => Self::Fill(color),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Transparent)
    }
}

impl Default for BackgroundEffect {
    fn default() -> Self {
        Self::Transparent
    }
}

/// Gaussian blur of everything behind the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurEffect {
    pub enabled: bool,
    pub radius_px: u32,
}

impl Default for BlurEffect {
    fn default() -> Self {
        Self {
            enabled: false,
            radius_px: 10,
        }
    }
}

/// Desaturation of everything behind the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrayscaleEffect {
    pub enabled: bool,
}

/// Coloured outline around the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderEffect {
    pub enabled: bool,
    pub color: Color,
    pub size_px: u32,
}

impl BorderEffect {
    /// Dilation radius used for the outline
    #[must_use]
    pub fn thickness(&self) -> u32 {
        crate::mask::thickness(self.size_px)
    }
}

impl Default for BorderEffect {
    fn default() -> Self {
        Self {
            enabled: false,
            color: Color::WHITE,
            size_px: 40,
        }
    }
}

/// Complete set of user-selected effects for one render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub background: BackgroundEffect,
    pub blur: BlurEffect,
    pub grayscale: GrayscaleEffect,
    pub border: BorderEffect,
}

impl EffectConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    /// ```rust
    /// use imgly_bgcompose::config::{Color, EffectConfig};
    ///
    /// let effects = EffectConfig::builder()
    ///     .background_color(Color::BLACK)
    ///     .blur(8)
    ///     .border(Color::rgb(255, 0, 0), 40)
    ///     .build()
    ///     .unwrap();
    /// assert!(effects.blur.enabled);
    /// ```
    #[must_use]
    pub fn builder() -> EffectConfigBuilder {
        EffectConfigBuilder::default()
    }

    /// Load an effect configuration from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CompositeError::invalid_config(format!("Invalid effect JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_background(self, background: BackgroundEffect) -> Self {
        Self { background, ..self }
    }

    #[must_use]
    pub fn with_blur(self, blur: BlurEffect) -> Self {
        Self { blur, ..self }
    }

    #[must_use]
    pub fn with_grayscale(self, enabled: bool) -> Self {
        Self {
            grayscale: GrayscaleEffect { enabled },
            ..self
        }
    }

    #[must_use]
    pub fn with_border(self, border: BorderEffect) -> Self {
        Self { border, ..self }
    }

    /// Names of the effects that will run, in render order
    #[must_use]
    pub fn enabled_effects(&self) -> Vec<&'static str> {
        let mut effects = Vec::new();
        match self.background {
            BackgroundEffect::Transparent => {},
            BackgroundEffect::Fill(_) => effects.push("background-fill"),
            BackgroundEffect::Original => effects.push("background-original"),
        }
        if self.blur.enabled {
            effects.push("blur");
        }
        if self.grayscale.enabled {
            effects.push("grayscale");
        }
        if self.border.enabled {
            effects.push("border");
        }
        effects
    }

    /// Validate effect parameters
    ///
    /// # Validation Rules
    ///
    /// - Blur radius: 0-100 pixels
    /// - Border size: 0-400 pixels
    pub fn validate(&self) -> Result<()> {
        if self.blur.radius_px > MAX_BLUR_RADIUS_PX {
            return Err(CompositeError::config_value_error(
                "blur radius",
                self.blur.radius_px,
                "0-100",
                Some(10),
            ));
        }

        if self.border.size_px > MAX_BORDER_SIZE_PX {
            return Err(CompositeError::config_value_error(
                "border size",
                self.border.size_px,
                "0-400",
                Some(40),
            ));
        }

        Ok(())
    }
}

/// Builder for `EffectConfig`
#[derive(Debug, Default)]
pub struct EffectConfigBuilder {
    config: EffectConfig,
}

impl EffectConfigBuilder {
    /// Fill the background with a solid colour
    #[must_use]
    pub fn background_color(mut self, color: Color) -> Self {
        self.config.background = BackgroundEffect::Fill(color);
        self
    }

    /// Keep the original photo as background
    #[must_use]
    pub fn original_background(mut self) -> Self {
        self.config.background = BackgroundEffect::Original;
        self
    }

    /// Set the background from UI toggles
    #[must_use]
    pub fn background_toggles(mut self, enabled: bool, use_original: bool, color: Color) -> Self {
        self.config.background = BackgroundEffect::from_toggles(enabled, use_original, color);
        self
    }

    /// Enable background blur with the given radius
    #[must_use]
    pub fn blur(mut self, radius_px: u32) -> Self {
        self.config.blur = BlurEffect {
            enabled: true,
            radius_px,
        };
        self
    }

    #[must_use]
    pub fn grayscale(mut self, enabled: bool) -> Self {
        self.config.grayscale.enabled = enabled;
        self
    }

    /// Enable the outline with the given colour and size
    #[must_use]
    pub fn border(mut self, color: Color, size_px: u32) -> Self {
        self.config.border = BorderEffect {
            enabled: true,
            color,
            size_px,
        };
        self
    }

    /// Build the effect configuration
    pub fn build(self) -> Result<EffectConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Memory bound applied to every surface allocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceLimits {
    /// Maximum surface size in megapixels
    pub max_megapixels: f64,
}

impl SurfaceLimits {
    /// Largest pixel count a surface may have
    #[must_use]
    pub fn max_pixels(&self) -> u64 {
        (self.max_megapixels * 1_000_000.0).floor() as u64
    }
}

impl Default for SurfaceLimits {
    fn default() -> Self {
        Self {
            max_megapixels: 50.0,
        }
    }
}

/// Transparency indicator drawn when the background is disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerboardStyle {
    pub tile_size: u32,
    pub light: Color,
    pub dark: Color,
}

impl Default for CheckerboardStyle {
    fn default() -> Self {
        Self {
            tile_size: 32,
            light: Color::WHITE,
            dark: Color::rgb(0xf5, 0xf7, 0xfa),
        }
    }
}

/// Configuration for the compositing pipeline itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Allocation bound for every surface
    pub limits: SurfaceLimits,
    /// Number of surfaces that may be checked out at once
    pub pool_capacity: usize,
    /// Checkerboard drawn for a disabled background
    pub checkerboard: CheckerboardStyle,
    /// Enable verbose progress reporting
    pub verbose_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: SurfaceLimits::default(),
            pool_capacity: 4,
            checkerboard: CheckerboardStyle::default(),
            verbose_progress: false,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate pipeline parameters
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_megapixels.is_nan() || self.limits.max_megapixels <= 0.0 {
            return Err(CompositeError::config_value_error(
                "max megapixels",
                self.limits.max_megapixels,
                "> 0",
                Some(50.0),
            ));
        }

        if self.pool_capacity == 0 {
            return Err(CompositeError::config_value_error(
                "pool capacity",
                self.pool_capacity,
                ">= 1",
                Some(4),
            ));
        }

        if self.checkerboard.tile_size == 0 {
            return Err(CompositeError::config_value_error(
                "checkerboard tile size",
                self.checkerboard.tile_size,
                ">= 1",
                Some(32),
            ));
        }

        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn max_megapixels(mut self, max_megapixels: f64) -> Self {
        self.config.limits.max_megapixels = max_megapixels;
        self
    }

    #[must_use]
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = capacity;
        self
    }

    #[must_use]
    pub fn checkerboard(mut self, style: CheckerboardStyle) -> Self {
        self.config.checkerboard = style;
        self
    }

    #[must_use]
    pub fn verbose_progress(mut self, verbose: bool) -> Self {
        self.config.verbose_progress = verbose;
        self
    }

    /// Build the pipeline configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
