use super::{EffectStage, RenderInputs, StageKind, StageResources};
use crate::{
    error::Result,
    surface::{CompositeMode, RasterSurface},
};
use tracing::trace;

/// Blurs the background and cuts a subject-shaped hole into it
///
/// Without the hole, blurred subject pixels would bleed out around the
/// sharp foreground drawn later.
#[derive(Debug, Clone, Copy)]
pub struct BlurStage {
    radius_px: u32,
}

impl BlurStage {
    #[must_use]
    pub fn new(radius_px: u32) -> Self {
        Self { radius_px }
    }
}

impl EffectStage for BlurStage {
    fn kind(&self) -> StageKind {
        StageKind::Blur
    }

    fn apply(
        &self,
        canvas: &mut RasterSurface,
        inputs: &RenderInputs<'_>,
        resources: &mut StageResources<'_>,
    ) -> Result<()> {
        let (width, height) = canvas.dimensions();
        trace!(radius_px = self.radius_px, "Blurring background");

        let mut staging = resources.pool.checkout(width, height)?;
        let blurred = staging.copy_from(canvas).and_then(|()| {
            staging.apply_gaussian_blur(self.radius_px);
            canvas.copy_from(&staging)
        });
        resources.pool.checkin(staging);
        blurred?;

        let mut cutout = resources.pool.checkout(width, height)?;
        cutout.blit(inputs.foreground, CompositeMode::SourceOver);
        canvas.blit(cutout.as_image(), CompositeMode::DestinationOut);
        resources.pool.checkin(cutout);

        Ok(())
    }
}
