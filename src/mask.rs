//! Binary masks and morphological dilation for subject outlines

use crate::{
    config::Color,
    error::Result,
    pool::SurfacePool,
    surface::{CompositeMode, RasterSurface},
};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use std::collections::HashMap;
use tracing::trace;

/// Mask value for covered pixels
pub const MASK_ON: u8 = u8::MAX;

/// Dilation radius for a user-facing border size
///
/// `max(1, floor(size_px / 8))`, so even a zero-sized border stays visible.
#[must_use]
pub fn thickness(size_px: u32) -> u32 {
    (size_px / 8).max(1)
}

/// Single-channel coverage mask holding only 0 and 255
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pixels: GrayImage,
    padding: u32,
}

impl Mask {
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

    /// Extra pixels added on every side relative to the source image
    #[must_use]
    pub fn padding(&self) -> u32 {
        self.padding
    }

    #[must_use]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.pixels
            .get_pixel_checked(x, y)
            .is_some_and(|p| p[0] == MASK_ON)
    }

    /// Number of covered pixels
    #[must_use]
    pub fn coverage(&self) -> usize {
        self.pixels.as_raw().iter().filter(|&&v| v == MASK_ON).count()
    }

    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    /// Stencil image whose alpha channel is the mask
    #[must_use]
    pub fn to_alpha_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            Rgba([0, 0, 0, self.pixels.get_pixel(x, y)[0]])
        })
    }
}

/// Builds silhouettes and outline masks, caching disk kernels by radius
#[derive(Debug, Default)]
pub struct MaskBuilder {
    disks: HashMap<u32, Vec<(i32, i32)>>,
}

impl MaskBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offsets `(dx, dy)` with `dx² + dy² <= radius²`, row-major
    pub fn disk_offsets(&mut self, radius: u32) -> &[(i32, i32)] {
        self.disks.entry(radius).or_insert_with(|| {
            trace!(radius, "Building disk kernel");
            let r = radius as i32;
            let r_squared = i64::from(r) * i64::from(r);
            let mut offsets = Vec::new();
            for dy in -r..=r {
                for dx in -r..=r {
                    if i64::from(dx * dx) + i64::from(dy * dy) <= r_squared {
                        offsets.push((dx, dy));
                    }
                }
            }
            offsets
        })
    }

    /// Number of radii currently cached
    #[must_use]
    pub fn cached_kernels(&self) -> usize {
        self.disks.len()
    }

    /// Mask of every pixel with non-zero alpha
    #[must_use]
    pub fn silhouette(image: &RgbaImage) -> Mask {
        let pixels = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if image.get_pixel(x, y)[3] > 0 {
                Luma([MASK_ON])
            } else {
                Luma([0])
            }
        });
        Mask { pixels, padding: 0 }
    }

    /// Grow the silhouette of `source` by a disk of `radius_px`
    ///
    /// The result is `2 * radius_px` larger in each dimension; source pixel
    /// `(x, y)` maps to `(x + radius_px, y + radius_px)`. A non-positive
    /// radius returns the plain silhouette.
    pub fn dilate(&mut self, source: &RgbaImage, radius_px: i32) -> Mask {
        let Ok(radius) = u32::try_from(radius_px) else {
            return Self::silhouette(source);
        };
        if radius == 0 {
            return Self::silhouette(source);
        }

        let coverage: Vec<bool> = source.pixels().map(|p| p[3] > 0).collect();
        let offsets = self.disk_offsets(radius);
        let pixels = stamp(&coverage, source.width(), source.height(), radius, offsets);

        Mask {
            pixels,
            padding: radius,
        }
    }

    /// Fill the mask area with `color`, keeping it only where the mask is set
    ///
    /// The returned surface is checked out of `pool`; the caller checks it
    /// back in.
    pub fn colorize(mask: &Mask, color: Color, pool: &mut SurfacePool) -> Result<RasterSurface> {
        let (width, height) = mask.dimensions();
        let mut surface = pool.checkout(width, height)?;
        surface.fill_rect(0, 0, width, height, color);
        surface.blit(&mask.to_alpha_image(), CompositeMode::DestinationIn);
        Ok(surface)
    }
}

/// OR every covered source pixel into the accumulator once per offset
fn stamp(coverage: &[bool], width: u32, height: u32, radius: u32, offsets: &[(i32, i32)]) -> GrayImage {
    let out_width = width + 2 * radius;
    let mut accumulator = GrayImage::new(out_width, height + 2 * radius);
    let row_len = width as usize;
    if row_len == 0 {
        return accumulator;
    }

    let buffer: &mut [u8] = &mut accumulator;
    for &(dx, dy) in offsets {
        let origin_x = (radius as i32 + dx) as usize;
        let origin_y = (radius as i32 + dy) as usize;

        for (y, source_row) in coverage.chunks_exact(row_len).enumerate() {
            let start = (origin_y + y) * out_width as usize + origin_x;
            let Some(target_row) = buffer.get_mut(start..start + row_len) else {
                continue;
            };
            for (target, &covered) in target_row.iter_mut().zip(source_row) {
                if covered {
                    *target = MASK_ON;
                }
            }
        }
    }

    accumulator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurfaceLimits;

    fn single_pixel(width: u32, height: u32, x: u32, y: u32) -> RgbaImage {
        let mut image = RgbaImage::new(width, height);
        image.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        image
    }

    #[test]
    fn test_thickness_values() {
        assert_eq!(thickness(0), 1);
        assert_eq!(thickness(7), 1);
        assert_eq!(thickness(40), 5);
        assert_eq!(thickness(200), 25);

        let mut previous = 0;
        for size in 0..=400 {
            let t = thickness(size);
            assert!(t >= previous);
            previous = t;
        }
    }

    #[test]
    fn test_disk_offsets() {
        let mut builder = MaskBuilder::new();
        assert_eq!(builder.disk_offsets(0), &[(0, 0)]);
        assert_eq!(
            builder.disk_offsets(1),
            &[(0, -1), (-1, 0), (0, 0), (1, 0), (0, 1)]
        );
        assert_eq!(builder.disk_offsets(2).len(), 13);
        assert_eq!(builder.cached_kernels(), 3);

        builder.disk_offsets(2);
        assert_eq!(builder.cached_kernels(), 3);
    }

    #[test]
    fn test_silhouette_is_binary() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([10, 10, 10, 1]));
        image.put_pixel(1, 0, Rgba([10, 10, 10, 255]));

        let mask = MaskBuilder::silhouette(&image);
        assert_eq!(mask.padding(), 0);
        assert_eq!(mask.as_gray().as_raw(), &vec![255u8, 255, 0]);
    }

    #[test]
    fn test_dilate_single_pixel_gives_disk() {
        let mut builder = MaskBuilder::new();
        let mask = builder.dilate(&single_pixel(1, 1, 0, 0), 2);

        assert_eq!(mask.dimensions(), (5, 5));
        assert_eq!(mask.padding(), 2);
        assert_eq!(mask.coverage(), 13);
        assert!(mask.is_set(2, 2));
        assert!(mask.is_set(0, 2));
        assert!(mask.is_set(3, 3));
        assert!(!mask.is_set(0, 0));
        assert!(!mask.is_set(4, 4));
    }

    #[test]
    fn test_dilate_non_positive_radius_is_silhouette() {
        let mut builder = MaskBuilder::new();
        let source = single_pixel(4, 4, 1, 2);
        let silhouette = MaskBuilder::silhouette(&source);

        assert_eq!(builder.dilate(&source, 0), silhouette);
        assert_eq!(builder.dilate(&source, -3), silhouette);
    }

    #[test]
    fn test_dilate_contains_translated_silhouette() {
        let mut builder = MaskBuilder::new();
        let mut source = RgbaImage::new(6, 4);
        source.put_pixel(1, 1, Rgba([0, 0, 0, 255]));
        source.put_pixel(4, 2, Rgba([0, 0, 0, 30]));

        let mask = builder.dilate(&source, 3);
        assert_eq!(mask.dimensions(), (12, 10));
        assert!(mask.is_set(1 + 3, 1 + 3));
        assert!(mask.is_set(4 + 3, 2 + 3));
    }

    #[test]
    fn test_stamp_is_order_independent() {
        let mut builder = MaskBuilder::new();
        let mut source = RgbaImage::new(5, 5);
        for (x, y) in [(0, 0), (2, 3), (4, 1)] {
            source.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
        let coverage: Vec<bool> = source.pixels().map(|p| p[3] > 0).collect();

        let forward = builder.disk_offsets(2).to_vec();
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(
            stamp(&coverage, 5, 5, 2, &forward),
            stamp(&coverage, 5, 5, 2, &reversed)
        );
    }

    #[test]
    fn test_colorize_cuts_color_to_mask() {
        let mut builder = MaskBuilder::new();
        let mut pool = SurfacePool::new(1, SurfaceLimits::default());
        let mask = builder.dilate(&single_pixel(1, 1, 0, 0), 1);
        let border = Color::rgb(255, 0, 0);

        let surface = MaskBuilder::colorize(&mask, border, &mut pool).unwrap();
        assert_eq!(surface.dimensions(), (3, 3));
        assert_eq!(surface.pixel(1, 1).unwrap().0, [255, 0, 0, 255]);
        assert_eq!(surface.pixel(1, 0).unwrap().0, [255, 0, 0, 255]);
        assert_eq!(surface.pixel(0, 0).unwrap().0, [0, 0, 0, 0]);
        assert_eq!(pool.outstanding(), 1);

        pool.checkin(surface);
        assert_eq!(pool.outstanding(), 0);
    }
}
