use labelsnap_model::{CropRegion, DocumentMeta};

/// A page the caller must now render through the raster backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    pub page: u32,
}

/// Page navigation for one open document, pages 1-based.
///
/// Exactly one render may be in flight per canvas: every accepted transition
/// marks the navigator busy and hands back a [`RenderRequest`], and further
/// transitions are rejected until [`Navigator::finish_render`] is called
/// (reject-while-busy, rather than queueing the latest request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    current_page: u32,
    page_count: u32,
    rendering: bool,
}

impl Navigator {
    pub fn new(page_count: u32) -> Self {
        Self { current_page: 1, page_count: page_count.max(1), rendering: false }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// True while a render is in flight; callers surface this as a loading
    /// indicator and should not feed further navigation input.
    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Request the first render after a document is opened.
    pub fn initial_render(&mut self) -> RenderRequest {
        self.rendering = true;
        RenderRequest { page: self.current_page }
    }

    pub fn next(&mut self) -> Option<RenderRequest> {
        self.transition_to(self.current_page.saturating_add(1))
    }

    pub fn previous(&mut self) -> Option<RenderRequest> {
        self.transition_to(self.current_page.saturating_sub(1))
    }

    /// Jump to an absolute page. Out-of-range requests are rejected: the
    /// current page is unchanged and no render is triggered.
    pub fn jump_to(&mut self, page: u32) -> Option<RenderRequest> {
        self.transition_to(page)
    }

    pub fn finish_render(&mut self) {
        self.rendering = false;
    }

    fn transition_to(&mut self, page: u32) -> Option<RenderRequest> {
        if self.rendering {
            return None;
        }
        if page == 0 || page > self.page_count || page == self.current_page {
            return None;
        }

        self.current_page = page;
        self.rendering = true;
        Some(RenderRequest { page })
    }
}

/// Mutable state of one editing session: the open document, the single live
/// crop region, and the page navigator. Created on document load, dropped
/// wholesale on clear/replace; nothing here is ambient or global.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub meta: DocumentMeta,
    pub region: CropRegion,
    pub navigator: Navigator,
}

impl Session {
    pub fn open(meta: DocumentMeta) -> Self {
        let navigator = Navigator::new(meta.page_count);
        Self { meta, region: CropRegion::default(), navigator }
    }

    /// Replace the live region. All mutation paths (drag, preset load, AI
    /// suggestion) funnel through the clamp choke point here.
    pub fn set_region(&mut self, region: CropRegion) {
        self.region = region.clamp();
    }
}
