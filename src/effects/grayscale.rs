use super::{EffectStage, RenderInputs, StageKind, StageResources};
use crate::{error::Result, surface::RasterSurface};

/// Desaturates everything composited so far
///
/// Runs before the foreground is drawn, so the subject keeps its colours.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleStage;

impl EffectStage for GrayscaleStage {
    fn kind(&self) -> StageKind {
        StageKind::Grayscale
    }

    fn apply(
        &self,
        canvas: &mut RasterSurface,
        _inputs: &RenderInputs<'_>,
        _resources: &mut StageResources<'_>,
    ) -> Result<()> {
        canvas.to_grayscale();
        Ok(())
    }
}
