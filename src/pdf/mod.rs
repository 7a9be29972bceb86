//! PDF document source built on pdfium-render.
//!
//! This module provides:
//! - Bundled asset lookup
//! - A renderer abstraction with a PDFium backend
//! - The document source that copies, opens and rasterizes a document

mod assets;
mod renderer;
mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use assets::*;
pub use renderer::*;
pub use source::*;
