use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed render multiplier over the page's nominal point size. Labels carry
/// barcodes, so pages are rasterized at 2x to stay scannable after the crop.
pub const RENDER_SCALE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSizePt {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// RGBA8 page raster with explicit dimensions.
///
/// One instance backs the interactive preview; the batch exporter owns a
/// second instance that is resized and overwritten for every page, so a run
/// over a large document never holds more than one page in memory.
#[derive(Debug, Clone, Default)]
pub struct PixelRaster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PixelRaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize to the next page's dimensions, reusing the allocation when the
    /// existing capacity suffices.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.resize(width as usize * height as usize * 4, 0);
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("failed to render page {page}: {detail}")]
    RenderFailed { page: u32, detail: String },
    #[error("backend error: {0}")]
    Backend(String),
}

/// Uniform "render page N at scale S into a pixel buffer" capability over a
/// document-rasterization backend. Pages are 1-based.
pub trait RasterBackend: Send {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, RasterError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, RasterError>;
    fn page_size(&self, handle: DocumentHandle, page: u32) -> Result<PageSizePt, RasterError>;

    /// Render a page into `target`, resizing it to the page's pixel
    /// dimensions at `scale` first. On error the buffer contents are
    /// unspecified and must not be consumed.
    fn render_into(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f32,
        target: &mut PixelRaster,
    ) -> Result<(), RasterError>;

    fn close(&mut self, handle: DocumentHandle) -> Result<(), RasterError>;
}

fn check_page(page: u32, page_count: u32) -> Result<(), RasterError> {
    if page == 0 || page > page_count {
        return Err(RasterError::PageOutOfRange { page, page_count });
    }
    Ok(())
}

fn scaled_dimensions(size: PageSizePt, scale: f32) -> (u32, u32) {
    let scale = if scale <= 0.0 { 1.0 } else { scale };
    let width = (size.width_pt * scale).round().max(1.0) as u32;
    let height = (size.height_pt * scale).round().max(1.0) as u32;
    (width, height)
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    page_sizes: Vec<PageSizePt>,
}

/// Software backend: parses page geometry with `lopdf` and renders a white
/// placeholder raster with a hairline border. Deterministic, no native
/// library involved, which is what the test suites run against. Real
/// rasterization lives in [`pdfium_backend`].
#[derive(Debug, Default)]
pub struct LopdfBackend {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSizePt>, RasterError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(RasterError::EncryptedUnsupported);
        }

        let doc = lopdf::Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSizePt { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(PageSizePt { width_pt: 612.0, height_pt: 792.0 });

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(RasterError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, RasterError> {
        self.docs.get(&handle).ok_or(RasterError::InvalidHandle(handle.raw()))
    }
}

impl RasterBackend for LopdfBackend {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, RasterError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        tracing::debug!(handle = handle.raw(), pages = page_sizes.len(), "opened document");
        self.docs.insert(handle, DocumentRecord { page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, RasterError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page: u32) -> Result<PageSizePt, RasterError> {
        let record = self.record(handle)?;
        check_page(page, record.page_sizes.len() as u32)?;
        Ok(record.page_sizes[(page - 1) as usize])
    }

    fn render_into(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f32,
        target: &mut PixelRaster,
    ) -> Result<(), RasterError> {
        let size = self.page_size(handle, page)?;
        let (width, height) = scaled_dimensions(size, scale);

        target.resize(width, height);
        target.fill([255, 255, 255, 255]);

        if width >= 4 && height >= 4 {
            let border = [220, 220, 220, 255];
            for x in 0..width {
                put_pixel(target, x, 0, border);
                put_pixel(target, x, height - 1, border);
            }
            for y in 0..height {
                put_pixel(target, 0, y, border);
                put_pixel(target, width - 1, y, border);
            }
        }

        tracing::debug!(page, width, height, "rendered placeholder raster");
        Ok(())
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), RasterError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(RasterError::InvalidHandle(handle.raw()))
    }
}

fn put_pixel(raster: &mut PixelRaster, x: u32, y: u32, rgba: [u8; 4]) {
    let index = (y as usize * raster.width as usize + x as usize) * 4;
    raster.pixels[index..index + 4].copy_from_slice(&rgba);
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Real rasterization through the system pdfium library. Document bytes
    /// are kept per handle and reloaded per render call, which keeps the
    /// backend free of self-referential lifetimes at the cost of a reparse.
    pub struct PdfiumBackend {
        pdfium: Pdfium,
        next_handle: u64,
        docs: HashMap<DocumentHandle, Vec<u8>>,
    }

    impl PdfiumBackend {
        pub fn from_system_library() -> Result<Self, RasterError> {
            let bindings = Pdfium::bind_to_system_library().map_err(|err| {
                RasterError::Backend(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self { pdfium: Pdfium::new(bindings), next_handle: 0, docs: HashMap::new() })
        }

        fn bytes(&self, handle: DocumentHandle) -> Result<&[u8], RasterError> {
            self.docs
                .get(&handle)
                .map(Vec::as_slice)
                .ok_or(RasterError::InvalidHandle(handle.raw()))
        }

        fn load(&self, handle: DocumentHandle) -> Result<PdfDocument<'_>, RasterError> {
            self.pdfium
                .load_pdf_from_byte_slice(self.bytes(handle)?, None)
                .map_err(|err| RasterError::Backend(err.to_string()))
        }
    }

    impl RasterBackend for PdfiumBackend {
        fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, RasterError> {
            let bytes = match source {
                OpenSource::Path(path) => fs::read(path)?,
                OpenSource::Bytes(bytes) => bytes,
            };

            self.pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|err| RasterError::Backend(err.to_string()))?;

            self.next_handle += 1;
            let handle = DocumentHandle(self.next_handle);
            self.docs.insert(handle, bytes);

            Ok(handle)
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, RasterError> {
            Ok(self.load(handle)?.pages().len() as u32)
        }

        fn page_size(&self, handle: DocumentHandle, page: u32) -> Result<PageSizePt, RasterError> {
            let document = self.load(handle)?;
            let page_count = document.pages().len() as u32;
            check_page(page, page_count)?;

            let page = document
                .pages()
                .get((page - 1) as u16)
                .map_err(|err| RasterError::Backend(err.to_string()))?;

            Ok(PageSizePt { width_pt: page.width().value, height_pt: page.height().value })
        }

        fn render_into(
            &self,
            handle: DocumentHandle,
            page: u32,
            scale: f32,
            target: &mut PixelRaster,
        ) -> Result<(), RasterError> {
            let size = self.page_size(handle, page)?;
            let (width, height) = scaled_dimensions(size, scale);

            let document = self.load(handle)?;
            let pdf_page = document
                .pages()
                .get((page - 1) as u16)
                .map_err(|err| RasterError::RenderFailed { page, detail: err.to_string() })?;

            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_target_height(height as i32);

            let bitmap = pdf_page
                .render_with_config(&config)
                .map_err(|err| RasterError::RenderFailed { page, detail: err.to_string() })?;

            // pdfium fits the target box while preserving its own page-size
            // reckoning, so the bitmap can be a pixel off the requested
            // dimensions. The bitmap is the source of truth for the raster.
            let bitmap_width = bitmap.width() as u32;
            let bitmap_height = bitmap.height() as u32;
            let bytes = bitmap.as_rgba_bytes();
            if bytes.len() != bitmap_width as usize * bitmap_height as usize * 4 {
                return Err(RasterError::RenderFailed {
                    page,
                    detail: format!(
                        "bitmap byte length {} does not match {bitmap_width}x{bitmap_height}",
                        bytes.len()
                    ),
                });
            }

            target.resize(bitmap_width, bitmap_height);
            target.pixels.copy_from_slice(&bytes);

            Ok(())
        }

        fn close(&mut self, handle: DocumentHandle) -> Result<(), RasterError> {
            self.docs.remove(&handle).map(|_| ()).ok_or(RasterError::InvalidHandle(handle.raw()))
        }
    }
}

#[cfg(not(feature = "pdfium"))]
pub fn default_backend() -> Result<LopdfBackend, RasterError> {
    Ok(LopdfBackend::new())
}

#[cfg(feature = "pdfium")]
pub fn default_backend() -> Result<pdfium_backend::PdfiumBackend, RasterError> {
    pdfium_backend::PdfiumBackend::from_system_library()
}

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures {
    use lopdf::{dictionary, Document, Object};

    /// Build an in-memory PDF with one page per `(width_pt, height_pt)` entry.
    pub fn pdf_with_pages(sizes: &[(f32, f32)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = sizes
            .iter()
            .map(|&(width, height)| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                })
                .into()
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => sizes.len() as i64,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("fixture PDF should serialize");
        bytes
    }

    /// Bytes carrying the `/Encrypt` marker the open path screens for.
    pub fn encrypted_marker_pdf() -> Vec<u8> {
        b"%PDF-1.4\n1 0 obj\n<< /Encrypt 2 0 R >>\nendobj\n%%EOF\n".to_vec()
    }
}
