use crate::crop::crop_to_png;
use crate::ExportError;
use labelsnap_model::{CropRegion, DocumentMeta, ExportProgress};
use labelsnap_raster::{DocumentHandle, PixelRaster, RasterBackend, RENDER_SCALE};
use std::io::{Cursor, Write};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Receives batch progress. `update` fires with `{current: i}` *before* page
/// `i` is rendered, so a UI reads "now working on page i"; `clear` fires once
/// the run ends, on the success and the failure path alike.
pub trait ProgressSink {
    fn update(&mut self, progress: ExportProgress);
    fn clear(&mut self);
}

/// Sink for callers that do not surface progress.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&mut self, _progress: ExportProgress) {}
    fn clear(&mut self) {}
}

/// Finalized batch output: one zip holding one entry per page.
#[derive(Debug)]
pub struct ZipArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Single-page output.
pub struct EncodedPage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub fn page_file_name(page: u32) -> String {
    format!("label_page_{page}.png")
}

pub fn archive_file_name(meta: &DocumentMeta) -> String {
    format!("cropped_labels_{}.zip", meta.file_stem())
}

/// Crop one page and encode it, named for standalone download.
pub fn export_page(
    backend: &dyn RasterBackend,
    handle: DocumentHandle,
    page: u32,
    region: &CropRegion,
) -> Result<EncodedPage, ExportError> {
    let mut raster = PixelRaster::new();
    backend.render_into(handle, page, RENDER_SCALE, &mut raster)?;

    Ok(EncodedPage { file_name: page_file_name(page), bytes: crop_to_png(&raster, region)? })
}

/// Apply one region to every page of the document and package the crops into
/// a single zip archive.
///
/// Pages are processed strictly in increasing order through one reused raster
/// buffer, so archive entry order always matches page order and memory stays
/// bounded at one page. Any per-page failure aborts the whole batch: a partial
/// archive silently missing a page is worse than a visible failure, so no
/// artifact is produced on error. The progress sink is cleared either way.
pub fn export_all(
    backend: &dyn RasterBackend,
    handle: DocumentHandle,
    meta: &DocumentMeta,
    region: &CropRegion,
    sink: &mut dyn ProgressSink,
) -> Result<ZipArtifact, ExportError> {
    let result = run_batch(backend, handle, meta, region, sink);
    sink.clear();
    result
}

fn run_batch(
    backend: &dyn RasterBackend,
    handle: DocumentHandle,
    meta: &DocumentMeta,
    region: &CropRegion,
    sink: &mut dyn ProgressSink,
) -> Result<ZipArtifact, ExportError> {
    let total = meta.page_count;
    sink.update(ExportProgress { current: 0, total });
    info!(pages = total, document = %meta.file_name, "starting batch export");

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut raster = PixelRaster::new();

    for page in 1..=total {
        sink.update(ExportProgress { current: page, total });

        backend.render_into(handle, page, RENDER_SCALE, &mut raster)?;
        let png = crop_to_png(&raster, region)?;

        zip.start_file(page_file_name(page), options)?;
        zip.write_all(&png)?;
        debug!(page, total, "archived cropped page");
    }

    let bytes = zip.finish()?.into_inner();
    info!(pages = total, size = bytes.len(), "batch export complete");

    Ok(ZipArtifact { file_name: archive_file_name(meta), bytes })
}
