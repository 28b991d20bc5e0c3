//! Shadow Atlas Layout
//!
//! Pure math for packing one square shadow map per light into a single atlas
//! texture. Hosts render the depth slot once per light, passing
//! [`ShadowAtlasLayout::region`] as the frame viewport.

use glam::Vec4;

use crate::view::Viewport;

/// Smallest per-light resolution the layout will shrink to.
pub const MIN_SHADOW_RESOLUTION: u32 = 16;

// ============================================================================
// Grid Layout
// ============================================================================

/// Near-square grid of equally sized per-light regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowAtlasLayout {
    light_count: u32,
    columns: u32,
    rows: u32,
    resolution: u32,
}

impl ShadowAtlasLayout {
    /// Lays out `light_count` regions of `per_light_resolution` pixels,
    /// halving the resolution until the grid fits `max_dimension`.
    #[must_use]
    pub fn new(light_count: u32, per_light_resolution: u32, max_dimension: u32) -> Self {
        if light_count == 0 {
            return Self {
                light_count: 0,
                columns: 0,
                rows: 0,
                resolution: 0,
            };
        }

        let columns = light_count.isqrt() + u32::from(light_count.isqrt().pow(2) < light_count);
        let rows = light_count.div_ceil(columns);

        let mut resolution = per_light_resolution.max(MIN_SHADOW_RESOLUTION);
        while resolution > MIN_SHADOW_RESOLUTION
            && u64::from(columns.max(rows)) * u64::from(resolution) > u64::from(max_dimension)
        {
            resolution /= 2;
        }
        if resolution != per_light_resolution {
            log::debug!(
                "Shadow atlas: {light_count} lights at {per_light_resolution}px reduced to {resolution}px"
            );
        }

        Self {
            light_count,
            columns,
            rows,
            resolution,
        }
    }

    #[must_use]
    pub fn light_count(&self) -> u32 {
        self.light_count
    }

    #[must_use]
    pub fn columns(&self) -> u32 {
        self.columns
    }

    #[must_use]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Side length of every region in pixels.
    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Atlas texture size `(width, height)`.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.columns * self.resolution, self.rows * self.resolution)
    }

    /// Pixel viewport of light `index`, row-major.
    #[must_use]
    pub fn region(&self, index: u32) -> Option<Viewport> {
        if index >= self.light_count {
            return None;
        }
        let res = self.resolution as f32;
        let x = (index % self.columns) as f32 * res;
        let y = (index / self.columns) as f32 * res;
        Some(Viewport::new(x, y, res, res))
    }

    // ========================================================================
    // Shader-side Addressing
    // ========================================================================

    /// `(offset_u, offset_v, scale_u, scale_v)` mapping a light's `[0, 1]`
    /// shadow UVs into the atlas.
    #[must_use]
    pub fn uv_rect(&self, index: u32) -> Option<Vec4> {
        let region = self.region(index)?;
        let (width, height) = self.size();
        let (w, h) = (width as f32, height as f32);
        Some(Vec4::new(
            region.x / w,
            region.y / h,
            region.width / w,
            region.height / h,
        ))
    }
}
