//! Document source: a page renderer bound to a scratch copy of a bundled PDF.
//!
//! The renderer needs a seekable file, so the asset is copied into the scratch
//! directory first. At most one page is open at a time.

use super::assets::AssetStore;
use super::renderer::{
    OpenPage, OutlineEntry, PageRenderer, PdfError, RenderQuality, RenderedPage,
};
use image::RgbaImage;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Prefix of scratch copies, used to find leftovers from earlier sessions.
pub const SCRATCH_PREFIX: &str = "pagewise-";

/// How pages are rasterized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Pixels per point; 1.0 keeps the page's intrinsic size.
    pub scale: f32,
    pub quality: RenderQuality,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            quality: RenderQuality::Display,
        }
    }
}

pub struct DocumentSource<R: PageRenderer> {
    renderer: Option<R>,
    current_page: Option<R::Page>,
    file: Option<File>,
    scratch: Option<NamedTempFile>,
    page_count: u32,
    options: RenderOptions,
}

impl<R: PageRenderer> DocumentSource<R> {
    /// Copy the asset `name` into `scratch_dir` and open a renderer over it.
    ///
    /// `open_renderer` receives a read-only handle to the scratch copy.
    pub fn open<F>(
        assets: &AssetStore,
        name: &str,
        scratch_dir: &Path,
        options: RenderOptions,
        open_renderer: F,
    ) -> Result<Self, PdfError>
    where
        F: FnOnce(File) -> Result<R, PdfError>,
    {
        let mut asset = assets.open(name)?;

        let mut scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(".pdf")
            .tempfile_in(scratch_dir)?;
        io::copy(&mut asset, scratch.as_file_mut())?;
        scratch.as_file_mut().flush()?;

        let file = File::open(scratch.path())?;
        let renderer = open_renderer(file.try_clone()?)?;
        let page_count = renderer.page_count();

        log::info!(
            "Opened {} ({} pages) via {:?}",
            name,
            page_count,
            scratch.path()
        );

        Ok(Self {
            renderer: Some(renderer),
            current_page: None,
            file: Some(file),
            scratch: Some(scratch),
            page_count,
            options,
        })
    }

    /// Number of pages; 0 once closed.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn outline(&self) -> Vec<OutlineEntry> {
        self.renderer
            .as_ref()
            .map(PageRenderer::outline)
            .unwrap_or_default()
    }

    pub fn has_open_page(&self) -> bool {
        self.current_page.is_some()
    }

    /// Rasterize page `index` at its intrinsic size.
    ///
    /// Returns `Ok(None)` for indices outside `[0, page_count)`.
    pub fn render_page(&mut self, index: u32) -> Result<Option<RenderedPage>, PdfError> {
        if index >= self.page_count {
            return Ok(None);
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(None);
        };

        // Close the previous page before opening the next one.
        self.current_page = None;
        let page = renderer.open_page(index)?;

        let (width, height) = page.size();
        let mut image = RgbaImage::new(
            scaled_dimension(width, self.options.scale),
            scaled_dimension(height, self.options.scale),
        );
        page.render(&mut image, self.options.quality)?;
        self.current_page = Some(page);

        Ok(Some(RenderedPage { index, image }))
    }

    /// Release the open page, the renderer, the file handle and the scratch
    /// copy, in that order. Safe to call more than once.
    pub fn close(&mut self) {
        self.current_page = None;
        self.renderer = None;
        self.file = None;
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                log::warn!("Failed to remove scratch copy {:?}: {}", path, e);
            }
            log::debug!("Closed document source");
        }
        self.page_count = 0;
    }
}

impl<R: PageRenderer> Drop for DocumentSource<R> {
    fn drop(&mut self) {
        self.close();
    }
}

fn scaled_dimension(points: f32, scale: f32) -> u32 {
    ((points * scale).round() as u32).max(1)
}

/// Delete scratch copies left behind by sessions that never closed.
///
/// Returns the number of files removed.
pub fn purge_stale_scratch(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with(SCRATCH_PREFIX) && name.ends_with(".pdf")) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to remove stale scratch {:?}: {}", entry.path(), e),
        }
    }
    if removed > 0 {
        log::info!("Removed {} stale scratch file(s)", removed);
    }
    removed
}
