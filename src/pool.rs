//! Bounded pool of scratch surfaces
//!
//! Stages borrow temporary surfaces for blur staging, silhouettes and
//! outlines. The pool caps how many may be outstanding at once; running out
//! surfaces as [`CompositeError::SurfaceUnavailable`] instead of allocating
//! without bound.

use crate::{
    config::SurfaceLimits,
    error::{CompositeError, Result},
    surface::RasterSurface,
};
use log::{debug, trace};

#[derive(Debug)]
pub struct SurfacePool {
    capacity: usize,
    outstanding: usize,
    limits: SurfaceLimits,
    free: Vec<RasterSurface>,
}

impl SurfacePool {
    #[must_use]
    pub fn new(capacity: usize, limits: SurfaceLimits) -> Self {
        Self {
            capacity,
            outstanding: 0,
            limits,
            free: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Surfaces currently checked out and not yet returned
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Surfaces kept around for reuse
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Borrow a transparent, unrendered surface of the given size
    ///
    /// A free surface of matching size is reused when available.
    ///
    /// # Errors
    /// - `SurfaceUnavailable` when `capacity` surfaces are already out
    /// - `Allocation` when a new surface cannot be created
    pub fn checkout(&mut self, width: u32, height: u32) -> Result<RasterSurface> {
        if self.outstanding >= self.capacity {
            return Err(CompositeError::surface_unavailable(format!(
                "all {} scratch surfaces are in use",
                self.capacity
            )));
        }

        let surface = match self
            .free
            .iter()
            .position(|s| s.dimensions() == (width, height))
        {
            Some(index) => {
                let mut surface = self.free.swap_remove(index);
                surface.reset();
                trace!("Reusing pooled {}x{} surface", width, height);
                surface
            },
            None => {
                debug!("Allocating scratch surface {}x{}", width, height);
                RasterSurface::create(width, height, &self.limits)?
            },
        };

        self.outstanding += 1;
        Ok(surface)
    }

    /// Return a surface so later checkouts can reuse its buffer
    ///
    /// At most `capacity` idle surfaces are kept; the oldest is dropped first.
    pub fn checkin(&mut self, surface: RasterSurface) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.capacity == 0 {
            return;
        }
        if self.free.len() >= self.capacity {
            self.free.remove(0);
        }
        self.free.push(surface);
    }

    /// Drop every idle surface
    pub fn shrink(&mut self) {
        self.free.clear();
    }
}
