use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest crop edge, as a percentage of the page dimension.
pub const MIN_EDGE_PCT: f32 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("crop region maps to an empty pixel rectangle on a {raster_width}x{raster_height} raster")]
    InvalidRegion { raster_width: u32, raster_height: u32 },
}

/// Normalized crop rectangle in percent units (0-100), portable across
/// differently sized page rasters.
///
/// Instances are only produced through [`CropRegion::clamped`], which keeps
/// every region inside the unit page with edges of at least [`MIN_EDGE_PCT`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self { x: 10.0, y: 10.0, width: 80.0, height: 40.0 }
    }
}

impl CropRegion {
    /// Build a region from untrusted values, forcing all invariants.
    ///
    /// Edges are clamped to `[MIN_EDGE_PCT, 100]` first, then the origin is
    /// clamped so the rectangle stays inside the page. Non-finite inputs fall
    /// back to the page edge / minimum edge.
    pub fn clamped(x: f32, y: f32, width: f32, height: f32) -> Self {
        let width = finite_or(width, MIN_EDGE_PCT).clamp(MIN_EDGE_PCT, 100.0);
        let height = finite_or(height, MIN_EDGE_PCT).clamp(MIN_EDGE_PCT, 100.0);
        let x = finite_or(x, 0.0).clamp(0.0, 100.0 - width);
        let y = finite_or(y, 0.0).clamp(0.0, 100.0 - height);

        Self { x, y, width, height }
    }

    /// Re-apply the invariants to a possibly stale region (e.g. one read back
    /// from persisted state).
    pub fn clamp(self) -> Self {
        Self::clamped(self.x, self.y, self.width, self.height)
    }

    /// Map the region onto a raster of the given pixel dimensions.
    ///
    /// Always call this with the *target* raster's actual dimensions; pages in
    /// one document are not guaranteed uniform size.
    pub fn to_pixel_rect(
        &self,
        raster_width: u32,
        raster_height: u32,
    ) -> Result<PixelRect, GeometryError> {
        let x = pct_to_px(self.x, raster_width);
        let y = pct_to_px(self.y, raster_height);

        // Rounding each coordinate independently can overshoot the raster by
        // a pixel, so the extent is re-clamped against the far edge.
        let width = pct_to_px(self.width, raster_width).min(raster_width.saturating_sub(x));
        let height = pct_to_px(self.height, raster_height).min(raster_height.saturating_sub(y));

        if width == 0 || height == 0 {
            return Err(GeometryError::InvalidRegion { raster_width, raster_height });
        }

        Ok(PixelRect { x, y, width, height })
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn pct_to_px(pct: f32, dimension: u32) -> u32 {
    ((pct / 100.0) * dimension as f32).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Name and page count of the loaded document; the parsed document itself is
/// owned by the raster backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub file_name: String,
    pub page_count: u32,
}

impl DocumentMeta {
    pub fn new(file_name: impl Into<String>, page_count: u32) -> Self {
        Self { file_name: file_name.into(), page_count }
    }

    /// File name without its extension, used for deterministic export naming.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("document")
    }
}

/// Progress of one batch export run. `total` is fixed at batch start;
/// `current` never decreases within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    pub current: u32,
    pub total: u32,
}
