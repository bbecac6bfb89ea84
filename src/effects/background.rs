use super::{EffectStage, RenderInputs, StageKind, StageResources};
use crate::{
    config::{BackgroundEffect, CheckerboardStyle},
    error::Result,
    surface::{CompositeMode, RasterSurface},
};
use tracing::trace;

/// Paints what sits behind the subject
#[derive(Debug, Clone, Copy)]
pub struct BackgroundStage {
    mode: BackgroundEffect,
}

impl BackgroundStage {
    #[must_use]
    pub fn new(mode: BackgroundEffect) -> Self {
        Self { mode }
    }
}

impl EffectStage for BackgroundStage {
    fn kind(&self) -> StageKind {
        StageKind::Background
    }

    fn apply(
        &self,
        canvas: &mut RasterSurface,
        inputs: &RenderInputs<'_>,
        resources: &mut StageResources<'_>,
    ) -> Result<()> {
        match self.mode {
            BackgroundEffect::Transparent => draw_checkerboard(canvas, resources.checkerboard),
            BackgroundEffect::Original => canvas.blit(inputs.original, CompositeMode::SourceOver),
            BackgroundEffect::Fill(color) => {
                trace!(%color, "Filling background");
                canvas.fill_rect(0, 0, canvas.width(), canvas.height(), color);
            },
        }
        Ok(())
    }
}

/// Tile the canvas with the transparency indicator
///
/// The tile at origin `(x, y)` is light when `(x + y) % (2 * tile_size) == 0`.
pub fn draw_checkerboard(canvas: &mut RasterSurface, style: &CheckerboardStyle) {
    let tile = style.tile_size.max(1);
    let (width, height) = canvas.dimensions();

    for y in (0..height).step_by(tile as usize) {
        for x in (0..width).step_by(tile as usize) {
            let color = if (u64::from(x) + u64::from(y)) % (2 * u64::from(tile)) == 0 {
                style.light
            } else {
                style.dark
            };
            canvas.fill_rect(i64::from(x), i64::from(y), tile, tile, color);
        }
    }
}
