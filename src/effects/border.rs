use super::{EffectStage, RenderInputs, StageKind, StageResources};
use crate::{
    config::Color,
    error::Result,
    mask::MaskBuilder,
    surface::{CompositeMode, RasterSurface},
};
use tracing::trace;

/// Outlines the subject with a solid colour
///
/// The outline is the subject silhouette dilated by `thickness` pixels. The
/// foreground is drawn again on top so the outline never covers the subject.
#[derive(Debug, Clone, Copy)]
pub struct BorderStage {
    color: Color,
    thickness: u32,
}

impl BorderStage {
    #[must_use]
    pub fn new(color: Color, thickness: u32) -> Self {
        Self { color, thickness }
    }

    #[must_use]
    pub fn thickness(&self) -> u32 {
        self.thickness
    }
}

impl EffectStage for BorderStage {
    fn kind(&self) -> StageKind {
        StageKind::Border
    }

    fn apply(
        &self,
        canvas: &mut RasterSurface,
        inputs: &RenderInputs<'_>,
        resources: &mut StageResources<'_>,
    ) -> Result<()> {
        let radius = i32::try_from(self.thickness).unwrap_or(i32::MAX);
        let mask = resources.masks.dilate(inputs.foreground, radius);
        trace!(
            thickness = self.thickness,
            covered = mask.coverage(),
            "Dilated subject outline"
        );

        let outline = MaskBuilder::colorize(&mask, self.color, resources.pool)?;
        let offset = -i64::from(mask.padding());
        canvas.blit_at(outline.as_image(), CompositeMode::SourceOver, offset, offset);
        resources.pool.checkin(outline);

        canvas.blit(inputs.foreground, CompositeMode::SourceOver);
        Ok(())
    }
}
