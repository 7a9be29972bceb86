//! Page renderer abstraction and its PDFium implementation.
//!
//! Note: pdfium-render's Pdfium struct is not Send+Sync, so the bindings are
//! created on the render worker thread and live there for the whole session.
//! Everything that borrows them (document, open page) stays on that thread.

use image::RgbaImage;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Cursor;
use thiserror::Error;

/// Errors that can occur during PDF operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to initialize PDFium: {0}")]
    InitError(String),

    #[error("Bundled asset not found: {0}")]
    AssetNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load PDF: {0}")]
    LoadError(String),

    #[error("No document loaded")]
    NoDocument,

    #[error("Invalid page index: {0}")]
    InvalidPage(u32),

    #[error("Rendering failed: {0}")]
    RenderError(String),

    #[error("Image encoding failed: {0}")]
    ImageError(String),

    #[error("Render worker exited before the document was opened")]
    WorkerExited,
}

impl Serialize for PdfError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Rasterization quality, mirroring the renderer's display/print modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderQuality {
    #[default]
    Display,
    Print,
}

/// A titled jump target read from the document outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Target page index (0-based)
    pub page: u32,
    pub title: String,
}

/// A rasterized page held in memory.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page index (0-based)
    pub index: u32,
    /// RGBA8 pixels, 32 bits per pixel
    pub image: RgbaImage,
}

impl RenderedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode the page as PNG for the webview.
    pub fn to_png(&self) -> Result<Vec<u8>, PdfError> {
        let mut png_bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
            .map_err(|e| PdfError::ImageError(e.to_string()))?;
        Ok(png_bytes)
    }
}

/// Opens page renderers over a read-only document file.
///
/// Renderers may borrow the factory (PDFium documents borrow their bindings),
/// hence the generic associated lifetime.
pub trait RendererFactory {
    type Renderer<'a>: PageRenderer
    where
        Self: 'a;

    fn open<'a>(&'a self, file: File) -> Result<Self::Renderer<'a>, PdfError>;
}

/// An open document that can hand out pages for rasterization.
///
/// Dropping the renderer releases it.
pub trait PageRenderer {
    type Page: OpenPage;

    fn page_count(&self) -> u32;

    fn open_page(&mut self, index: u32) -> Result<Self::Page, PdfError>;

    fn outline(&self) -> Vec<OutlineEntry> {
        Vec::new()
    }
}

/// A single open page. Dropping it closes the page.
pub trait OpenPage {
    /// Intrinsic page size in points (1/72 inch).
    fn size(&self) -> (f32, f32);

    /// Rasterize into `target`, which is already sized by the caller.
    fn render(&self, target: &mut RgbaImage, quality: RenderQuality) -> Result<(), PdfError>;
}

/// Bind to the PDFium library.
///
/// Search order: next to the executable (bundled app), the macOS Frameworks
/// directory, the working directory, then the system library path.
fn bind_pdfium() -> Result<Pdfium, PdfError> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    if let Some(ref dir) = exe_dir {
        if let Ok(bindings) =
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
        {
            log::info!("Loaded bundled PDFium from {:?}", dir);
            return Ok(Pdfium::new(bindings));
        }

        #[cfg(target_os = "macos")]
        {
            let frameworks = dir.join("..").join("Frameworks");
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&frameworks))
            {
                log::info!("Loaded PDFium from app Frameworks");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PdfError::InitError(e.to_string()))?;
    log::info!("Loaded system PDFium");
    Ok(Pdfium::new(bindings))
}

/// Owns the PDFium bindings for one render worker.
pub struct PdfiumFactory {
    pdfium: Pdfium,
}

impl PdfiumFactory {
    pub fn bind() -> Result<Self, PdfError> {
        Ok(Self {
            pdfium: bind_pdfium()?,
        })
    }
}

impl RendererFactory for PdfiumFactory {
    type Renderer<'a> = PdfiumRenderer<'a>;

    fn open<'a>(&'a self, file: File) -> Result<PdfiumRenderer<'a>, PdfError> {
        let document = self
            .pdfium
            .load_pdf_from_reader(file, None)
            .map_err(|e| PdfError::LoadError(e.to_string()))?;
        Ok(PdfiumRenderer { document })
    }
}

pub struct PdfiumRenderer<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PageRenderer for PdfiumRenderer<'a> {
    type Page = PdfiumPage<'a>;

    fn page_count(&self) -> u32 {
        self.document.pages().len() as u32
    }

    fn open_page(&mut self, index: u32) -> Result<PdfiumPage<'a>, PdfError> {
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|_| PdfError::InvalidPage(index))?;
        Ok(PdfiumPage { page })
    }

    fn outline(&self) -> Vec<OutlineEntry> {
        self.document
            .bookmarks()
            .iter()
            .filter_map(|bookmark| {
                let title = bookmark.title()?;
                let page = bookmark.destination()?.page_index().ok()?;
                Some(OutlineEntry {
                    page: page as u32,
                    title,
                })
            })
            .collect()
    }
}

pub struct PdfiumPage<'a> {
    page: PdfPage<'a>,
}

impl OpenPage for PdfiumPage<'_> {
    fn size(&self) -> (f32, f32) {
        (self.page.width().value, self.page.height().value)
    }

    fn render(&self, target: &mut RgbaImage, quality: RenderQuality) -> Result<(), PdfError> {
        let (width, height) = target.dimensions();
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true)
            .render_annotations(true)
            .use_print_quality(quality == RenderQuality::Print);

        let bitmap = self
            .page
            .render_with_config(&config)
            .map_err(|e| PdfError::RenderError(e.to_string()))?;

        let rgba = bitmap.as_rgba_bytes();
        let expected = (width as usize) * (height as usize) * 4;
        if rgba.len() < expected {
            return Err(PdfError::RenderError(format!(
                "bitmap has {} bytes, expected {}",
                rgba.len(),
                expected
            )));
        }
        target.copy_from_slice(&rgba[..expected]);
        Ok(())
    }
}
