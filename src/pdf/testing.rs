//! In-memory renderer for tests. Counts every open and release.

use super::assets::AssetStore;
use super::renderer::{
    OpenPage, OutlineEntry, PageRenderer, PdfError, RenderQuality, RendererFactory,
};
use image::{Rgba, RgbaImage};
use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Default)]
pub struct Counters {
    pub renderers_opened: AtomicUsize,
    pub renderers_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub live_pages: AtomicUsize,
    pub max_live_pages: AtomicUsize,
}

pub struct FakeFactory {
    pub pages: Vec<(f32, f32)>,
    pub outline: Vec<OutlineEntry>,
    pub broken_pages: Vec<u32>,
    pub counters: Arc<Counters>,
    /// When set, every `open_page` waits for one token.
    pub gate: Option<Mutex<mpsc::Receiver<()>>>,
}

impl FakeFactory {
    pub fn with_pages(pages: &[(f32, f32)]) -> Self {
        Self {
            pages: pages.to_vec(),
            outline: Vec::new(),
            broken_pages: Vec::new(),
            counters: Arc::new(Counters::default()),
            gate: None,
        }
    }

    pub fn with_page_count(count: usize) -> Self {
        Self::with_pages(&vec![(595.0, 842.0); count])
    }

    pub fn gated(mut self, gate: mpsc::Receiver<()>) -> Self {
        self.gate = Some(Mutex::new(gate));
        self
    }
}

impl RendererFactory for FakeFactory {
    type Renderer<'a> = FakeRenderer<'a>;

    fn open<'a>(&'a self, mut file: File) -> Result<FakeRenderer<'a>, PdfError> {
        let mut header = [0u8; 5];
        file.read_exact(&mut header)
            .map_err(|e| PdfError::LoadError(e.to_string()))?;
        if &header != b"%PDF-" {
            return Err(PdfError::LoadError("missing PDF header".into()));
        }
        self.counters.renderers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeRenderer {
            factory: self,
            _file: file,
        })
    }
}

pub struct FakeRenderer<'a> {
    factory: &'a FakeFactory,
    _file: File,
}

impl<'a> PageRenderer for FakeRenderer<'a> {
    type Page = FakePage<'a>;

    fn page_count(&self) -> u32 {
        self.factory.pages.len() as u32
    }

    fn open_page(&mut self, index: u32) -> Result<FakePage<'a>, PdfError> {
        let factory: &'a FakeFactory = self.factory;
        if let Some(gate) = &factory.gate {
            let gate = gate.lock().unwrap_or_else(|e| e.into_inner());
            gate.recv()
                .map_err(|_| PdfError::RenderError("gate closed".into()))?;
        }
        let size = *factory
            .pages
            .get(index as usize)
            .ok_or(PdfError::InvalidPage(index))?;

        let counters = &factory.counters;
        counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        let live = counters.live_pages.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_live_pages.fetch_max(live, Ordering::SeqCst);

        Ok(FakePage {
            counters,
            size,
            broken: factory.broken_pages.contains(&index),
        })
    }

    fn outline(&self) -> Vec<OutlineEntry> {
        self.factory.outline.clone()
    }
}

impl Drop for FakeRenderer<'_> {
    fn drop(&mut self) {
        self.factory
            .counters
            .renderers_closed
            .fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakePage<'a> {
    counters: &'a Counters,
    size: (f32, f32),
    broken: bool,
}

impl OpenPage for FakePage<'_> {
    fn size(&self) -> (f32, f32) {
        self.size
    }

    fn render(&self, target: &mut RgbaImage, _quality: RenderQuality) -> Result<(), PdfError> {
        if self.broken {
            return Err(PdfError::RenderError("broken page".into()));
        }
        for pixel in target.pixels_mut() {
            *pixel = Rgba([255, 255, 255, 255]);
        }
        Ok(())
    }
}

impl Drop for FakePage<'_> {
    fn drop(&mut self) {
        self.counters.live_pages.fetch_sub(1, Ordering::SeqCst);
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Write a minimal PDF-looking asset into `dir` and return a store over it.
pub fn write_asset(dir: &TempDir, name: &str) -> AssetStore {
    std::fs::write(dir.path().join(name), b"%PDF-1.4\n%%EOF\n").unwrap();
    AssetStore::new(dir.path())
}
