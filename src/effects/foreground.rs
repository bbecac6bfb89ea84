use super::{EffectStage, RenderInputs, StageKind, StageResources};
use crate::{
    error::Result,
    surface::{CompositeMode, RasterSurface},
};

/// Draws the cut-out subject over the background
#[derive(Debug, Clone, Copy, Default)]
pub struct ForegroundStage;

impl EffectStage for ForegroundStage {
    fn kind(&self) -> StageKind {
        StageKind::Foreground
    }

    fn apply(
        &self,
        canvas: &mut RasterSurface,
        inputs: &RenderInputs<'_>,
        _resources: &mut StageResources<'_>,
    ) -> Result<()> {
        canvas.blit(inputs.foreground, CompositeMode::SourceOver);
        Ok(())
    }
}
