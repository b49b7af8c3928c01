use crate::ExportError;
use image::{ImageBuffer, ImageFormat, Rgba};
use labelsnap_model::CropRegion;
use labelsnap_raster::PixelRaster;
use std::io::Cursor;

/// Cut the region out of a rendered page and encode it as lossless PNG.
///
/// The pixel rectangle is computed against this raster's own dimensions, so
/// the same normalized region lands correctly on pages of different sizes.
/// The source raster is only read; the crop is copied into a fresh buffer.
pub fn crop_to_png(raster: &PixelRaster, region: &CropRegion) -> Result<Vec<u8>, ExportError> {
    // Percentage invariants alone do not guarantee a nonzero pixel rectangle
    // at very small raster sizes.
    let rect = region
        .to_pixel_rect(raster.width, raster.height)
        .map_err(|_| ExportError::EmptyCropRegion)?;

    let view: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_raw(raster.width, raster.height, raster.pixels.clone())
            .ok_or(ExportError::MalformedRaster)?;

    let cropped = image::imageops::crop_imm(&view, rect.x, rect.y, rect.width, rect.height)
        .to_image();

    let mut png = Vec::new();
    cropped.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(png)
}
