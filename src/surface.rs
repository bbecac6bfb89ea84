//! Offscreen RGBA8 drawing surface
//!
//! All compositing in the crate happens on a `RasterSurface`. Colours are
//! stored with straight (non-premultiplied) alpha and blending follows the
//! canvas compositing operators the editor was designed against.

use crate::{
    config::{Color, SurfaceLimits},
    error::{CompositeError, Result},
};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Rule used to combine a source image with the surface content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeMode {
    /// Normal alpha blending, source drawn over the destination
    SourceOver,
    /// Erase the destination wherever the source has coverage
    DestinationOut,
    /// Keep the destination only where the source has coverage
    DestinationIn,
}

impl std::fmt::Display for CompositeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceOver => write!(f, "source-over"),
            Self::DestinationOut => write!(f, "destination-out"),
            Self::DestinationIn => write!(f, "destination-in"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceState {
    /// Freshly allocated, nothing drawn yet
    Allocated,
    /// Cleared or drawn to at least once
    Rendered,
}

/// Mutable pixel buffer with canvas-style drawing operations
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixels: RgbaImage,
    state: SurfaceState,
}

impl RasterSurface {
    /// Allocate a fully transparent surface
    ///
    /// # Errors
    /// - Either dimension is zero
    /// - The pixel count exceeds `limits.max_megapixels`
    /// - The buffer cannot be allocated
    pub fn create(width: u32, height: u32, limits: &SurfaceLimits) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CompositeError::allocation(format!(
                "surface dimensions must be positive, got {}x{}",
                width, height
            )));
        }

        let pixel_count = u64::from(width) * u64::from(height);
        if pixel_count > limits.max_pixels() {
            return Err(CompositeError::allocation(format!(
                "{}x{} surface ({:.1} MP) exceeds the {} MP limit",
                width,
                height,
                pixel_count as f64 / 1_000_000.0,
                limits.max_megapixels
            )));
        }

        let byte_len = usize::try_from(pixel_count * 4).map_err(|_| {
            CompositeError::allocation(format!("{}x{} surface does not fit in memory", width, height))
        })?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(byte_len).map_err(|e| {
            CompositeError::allocation(format!(
                "failed to allocate {} bytes for {}x{} surface: {}",
                byte_len, width, height, e
            ))
        })?;
        buffer.resize(byte_len, 0);

        let pixels = RgbaImage::from_raw(width, height, buffer)
            .ok_or_else(|| CompositeError::allocation("surface buffer has the wrong length"))?;

        Ok(Self {
            pixels,
            state: SurfaceState::Allocated,
        })
    }

    /// Wrap an existing image as an already rendered surface
    #[must_use]
    pub fn from_image(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            state: SurfaceState::Rendered,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Whether the surface has been cleared or drawn to
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.state == SurfaceState::Rendered
    }

    /// Read a single pixel, `None` outside the surface
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.pixels.get_pixel_checked(x, y).copied()
    }

    #[must_use]
    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Reset every pixel to fully transparent
    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.state = SurfaceState::Rendered;
    }

    /// Zero the buffer and forget that it was ever drawn to
    pub(crate) fn reset(&mut self) {
        self.pixels.fill(0);
        self.state = SurfaceState::Allocated;
    }

    /// Fill a rectangle with a solid colour, clipped to the surface
    ///
    /// Opaque colours overwrite; translucent colours blend source-over.
    pub fn fill_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: Color) {
        self.state = SurfaceState::Rendered;

        let Some((x0, y0, x1, y1)) = self.clip(x, y, width, height) else {
            return;
        };

        let source = color.to_rgba();
        for py in y0..y1 {
            for px in x0..x1 {
                let dst = self.pixels.get_pixel_mut(px, py);
                blend_pixel(dst, source, CompositeMode::SourceOver);
            }
        }
    }

    /// Composite `source` onto the surface at the origin
    pub fn blit(&mut self, source: &RgbaImage, mode: CompositeMode) {
        self.blit_at(source, mode, 0, 0);
    }

    /// Composite `source` with its top-left corner at `(dx, dy)`
    ///
    /// `DestinationIn` also clears destination pixels the source does not
    /// cover, matching canvas semantics.
    pub fn blit_at(&mut self, source: &RgbaImage, mode: CompositeMode, dx: i64, dy: i64) {
        self.state = SurfaceState::Rendered;

        if mode == CompositeMode::DestinationIn {
            self.blit_destination_in(source, dx, dy);
            return;
        }

        let Some((x0, y0, x1, y1)) = self.clip(dx, dy, source.width(), source.height()) else {
            return;
        };

        for py in y0..y1 {
            let sy = (i64::from(py) - dy) as u32;
            for px in x0..x1 {
                let sx = (i64::from(px) - dx) as u32;
                let src = *source.get_pixel(sx, sy);
                blend_pixel(self.pixels.get_pixel_mut(px, py), src, mode);
            }
        }
    }

    fn blit_destination_in(&mut self, source: &RgbaImage, dx: i64, dy: i64) {
        let (width, height) = self.pixels.dimensions();
        for py in 0..height {
            let sy = i64::from(py) - dy;
            for px in 0..width {
                let sx = i64::from(px) - dx;
                let src = u32::try_from(sx)
                    .ok()
                    .zip(u32::try_from(sy).ok())
                    .and_then(|(sx, sy)| source.get_pixel_checked(sx, sy))
                    .copied()
                    .unwrap_or(Rgba([0, 0, 0, 0]));
                blend_pixel(
                    self.pixels.get_pixel_mut(px, py),
                    src,
                    CompositeMode::DestinationIn,
                );
            }
        }
    }

    /// Replace the whole content with another surface of the same size
    pub fn copy_from(&mut self, source: &RasterSurface) -> Result<()> {
        if source.dimensions() != self.dimensions() {
            return Err(CompositeError::input_mismatch(format!(
                "cannot copy a {}x{} surface into a {}x{} surface",
                source.width(),
                source.height(),
                self.width(),
                self.height()
            )));
        }

        self.pixels.copy_from_slice(source.pixels.as_raw());
        self.state = SurfaceState::Rendered;
        Ok(())
    }

    /// Gaussian blur with a standard deviation of `radius_px`
    ///
    /// A radius of zero leaves the surface untouched.
    pub fn apply_gaussian_blur(&mut self, radius_px: u32) {
        if radius_px == 0 {
            return;
        }
        self.pixels = image::imageops::blur(&self.pixels, radius_px as f32);
        self.state = SurfaceState::Rendered;
    }

    /// Replace R, G and B with their rounded arithmetic mean
    ///
    /// Alpha is untouched. Applying it twice equals applying it once.
    pub fn to_grayscale(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let sum = u16::from(r) + u16::from(g) + u16::from(b);
            // sum / 3 never has a fractional part of exactly one half
            let mean = ((sum + 1) / 3) as u8;
            *pixel = Rgba([mean, mean, mean, a]);
        }
        self.state = SurfaceState::Rendered;
    }

    /// Losslessly encode the surface as PNG
    ///
    /// # Errors
    /// - The surface was never cleared or drawn to
    /// - The PNG encoder failed
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        if !self.is_rendered() {
            return Err(CompositeError::encoding(
                "surface was never cleared or rendered",
            ));
        }
        crate::export::encode_png(&self.pixels)
    }

    /// Intersect a rectangle with the surface bounds
    fn clip(&self, x: i64, y: i64, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let (surface_w, surface_h) = self.pixels.dimensions();
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + i64::from(width)).min(i64::from(surface_w));
        let y1 = (y + i64::from(height)).min(i64::from(surface_h));

        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// Combine one source pixel into one destination pixel
///
/// Arithmetic is done in f32 on straight alpha and rounded back to u8. A
/// result with zero alpha is stored as transparent black.
pub fn blend_pixel(dst: &mut Rgba<u8>, src: Rgba<u8>, mode: CompositeMode) {
    let src_alpha = src[3];
    match mode {
        CompositeMode::SourceOver => {
            if src_alpha == 0 {
                return;
            }
            if src_alpha == u8::MAX {
                *dst = src;
                return;
            }

            let sa = f32::from(src_alpha) / 255.0;
            let da = f32::from(dst[3]) / 255.0;
            let out_a = sa + da * (1.0 - sa);
            if out_a <= 0.0 {
                *dst = Rgba([0, 0, 0, 0]);
                return;
            }

            let channel = |s: u8, d: u8| {
                let value = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
                value.round().clamp(0.0, 255.0) as u8
            };
            *dst = Rgba([
                channel(src[0], dst[0]),
                channel(src[1], dst[1]),
                channel(src[2], dst[2]),
                (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
            ]);
        },
        CompositeMode::DestinationOut => {
            if src_alpha == 0 {
                return;
            }
            let keep = 1.0 - f32::from(src_alpha) / 255.0;
            let alpha = (f32::from(dst[3]) * keep).round() as u8;
            set_alpha_or_clear(dst, alpha);
        },
        CompositeMode::DestinationIn => {
            if src_alpha == u8::MAX {
                return;
            }
            let keep = f32::from(src_alpha) / 255.0;
            let alpha = (f32::from(dst[3]) * keep).round() as u8;
            set_alpha_or_clear(dst, alpha);
        },
    }
}

fn set_alpha_or_clear(dst: &mut Rgba<u8>, alpha: u8) {
    if alpha == 0 {
        *dst = Rgba([0, 0, 0, 0]);
    } else {
        dst[3] = alpha;
    }
}
