//! Effect stages applied to the canvas in a fixed order
//!
//! Each user-facing effect is one [`EffectStage`]. The order is part of the
//! visual contract and is not configurable:
//!
//! 1. background (checkerboard, solid colour or the original photo)
//! 2. blur of the background, with a hole cut where the subject sits
//! 3. grayscale of everything drawn so far
//! 4. the foreground subject
//! 5. the outline around the subject

mod background;
mod blur;
mod border;
mod foreground;
mod grayscale;

pub use background::{draw_checkerboard, BackgroundStage};
pub use blur::BlurStage;
pub use border::BorderStage;
pub use foreground::ForegroundStage;
pub use grayscale::GrayscaleStage;

use crate::{
    config::{CheckerboardStyle, EffectConfig},
    error::Result,
    mask::MaskBuilder,
    pool::SurfacePool,
    surface::RasterSurface,
};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a stage in logs, timings and progress reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Background,
    Blur,
    Grayscale,
    Foreground,
    Border,
}

impl StageKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Blur => "blur",
            Self::Grayscale => "grayscale",
            Self::Foreground => "foreground",
            Self::Border => "border",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two decoded images a render works from
#[derive(Debug, Clone, Copy)]
pub struct RenderInputs<'a> {
    /// The unmodified photo
    pub original: &'a RgbaImage,
    /// The subject with a transparent background, same size as `original`
    pub foreground: &'a RgbaImage,
}

/// Shared scratch resources stages may borrow
#[derive(Debug)]
pub struct StageResources<'a> {
    pub pool: &'a mut SurfacePool,
    pub masks: &'a mut MaskBuilder,
    pub checkerboard: &'a CheckerboardStyle,
}

/// One transform of the canvas
pub trait EffectStage: Send + Sync + fmt::Debug {
    fn kind(&self) -> StageKind;

    /// Draw this stage onto `canvas`
    ///
    /// Every scratch surface checked out of `resources.pool` is returned
    /// before this method returns, on success and on error.
    fn apply(
        &self,
        canvas: &mut RasterSurface,
        inputs: &RenderInputs<'_>,
        resources: &mut StageResources<'_>,
    ) -> Result<()>;
}

/// Build the stage sequence for an effect configuration
///
/// Background and foreground always run; the rest only when enabled.
#[must_use]
pub fn stages_for(effects: &EffectConfig) -> Vec<Box<dyn EffectStage>> {
    let mut stages: Vec<Box<dyn EffectStage>> = vec![Box::new(BackgroundStage::new(effects.background))];

    if effects.blur.enabled {
        stages.push(Box::new(BlurStage::new(effects.blur.radius_px)));
    }
    if effects.grayscale.enabled {
        stages.push(Box::new(GrayscaleStage));
    }

    stages.push(Box::new(ForegroundStage));

    if effects.border.enabled {
        stages.push(Box::new(BorderStage::new(
            effects.border.color,
            effects.border.thickness(),
        )));
    }

    stages
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackgroundEffect, BlurEffect, BorderEffect, Color};

    fn kinds(effects: &EffectConfig) -> Vec<StageKind> {
        stages_for(effects).iter().map(|s| s.kind()).collect()
    }

    #[test]
    fn test_default_stages() {
        assert_eq!(
            kinds(&EffectConfig::default()),
            vec![StageKind::Background, StageKind::Foreground]
        );
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let effects = EffectConfig::default()
            .with_border(BorderEffect {
                enabled: true,
                ..BorderEffect::default()
            })
            .with_grayscale(true)
            .with_blur(BlurEffect {
                enabled: true,
                radius_px: 4,
            })
            .with_background(BackgroundEffect::Fill(Color::BLACK));

        assert_eq!(
            kinds(&effects),
            vec![
                StageKind::Background,
                StageKind::Blur,
                StageKind::Grayscale,
                StageKind::Foreground,
                StageKind::Border,
            ]
        );
    }

    #[test]
    fn test_stage_kind_names() {
        assert_eq!(StageKind::Grayscale.to_string(), "grayscale");
        assert_eq!(
            serde_json::to_string(&StageKind::Border).unwrap(),
            "\"border\""
        );
    }
}
