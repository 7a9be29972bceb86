//! Background render worker.
//!
//! One thread per session owns the renderer and the document source. It
//! reports the open result, waits for the start signal, rasterizes every page
//! in order, and closes the source when the loop ends or is cancelled.

use crate::pdf::{
    AssetStore, DocumentSource, OutlineEntry, PageRenderer, PdfError, RenderOptions,
    RenderedPage, RendererFactory,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

use super::page_label;

/// Cooperative cancellation flag shared with the worker.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Rendered pages in page order. `None` marks a page that failed to render.
#[derive(Debug, Default)]
pub struct PageStore {
    slots: Vec<Option<RenderedPage>>,
}

impl PageStore {
    pub fn push(&mut self, page: Option<RenderedPage>) {
        self.slots.push(page);
    }

    /// Number of pages processed so far, including failed ones.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn rendered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn get(&self, index: u32) -> Option<&RenderedPage> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }
}

pub type SharedPages = Arc<Mutex<PageStore>>;

/// What to open and how to rasterize it.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub assets: AssetStore,
    pub document: String,
    pub scratch_dir: PathBuf,
    pub options: RenderOptions,
}

/// Sent once the document is open, before any page is rendered.
#[derive(Debug, Clone)]
pub struct OpenReport {
    pub page_count: u32,
    pub outline: Vec<OutlineEntry>,
}

/// Progress notifications from the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RenderProgress {
    PageReady { index: u32, width: u32, height: u32 },
    PageSkipped { index: u32 },
    Finished { rendered: u32, cancelled: bool },
}

pub(crate) struct RenderJob {
    token: CancellationToken,
    start: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderJob {
    /// Let the worker start rendering. Only the first call has an effect.
    pub fn begin(&mut self) {
        if let Some(start) = self.start.take() {
            if start.send(()).is_err() {
                log::debug!("Render worker already exited");
            }
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker to exit. Safe to call more than once.
    ///
    /// A worker that was never started exits without rendering.
    pub fn join(&mut self) {
        self.start = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Render worker panicked");
            }
        }
    }
}

pub(crate) type OpenReceiver = oneshot::Receiver<Result<OpenReport, PdfError>>;

/// Start the worker thread.
///
/// `make_factory` runs on the worker, so the factory itself need not be `Send`.
/// Pages are not rendered until [`RenderJob::begin`] is called.
pub(crate) fn spawn<B, F, L>(
    request: LoadRequest,
    make_factory: B,
    pages: SharedPages,
    listener: L,
) -> Result<(OpenReceiver, RenderJob), PdfError>
where
    B: FnOnce() -> Result<F, PdfError> + Send + 'static,
    F: RendererFactory + 'static,
    L: Fn(RenderProgress) + Send + 'static,
{
    let (opened_tx, opened_rx) = oneshot::channel();
    let (start_tx, start_rx) = oneshot::channel::<()>();
    let token = CancellationToken::new();
    let worker_token = token.clone();

    let handle = thread::Builder::new()
        .name("pagewise-render".into())
        .spawn(move || {
            let factory = match make_factory() {
                Ok(factory) => factory,
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };

            let mut source = match DocumentSource::open(
                &request.assets,
                &request.document,
                &request.scratch_dir,
                request.options,
                |file| factory.open(file),
            ) {
                Ok(source) => source,
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };

            let report = OpenReport {
                page_count: source.page_count(),
                outline: source.outline(),
            };
            if opened_tx.send(Ok(report)).is_err() {
                log::debug!("Session dropped before the document opened");
            } else if start_rx.blocking_recv().is_err() {
                log::debug!("Session closed before rendering started");
            } else {
                render_all(&mut source, &worker_token, &pages, &listener);
            }
            source.close();
        })?;

    Ok((
        opened_rx,
        RenderJob {
            token,
            start: Some(start_tx),
            handle: Some(handle),
        },
    ))
}

fn render_all<R: PageRenderer>(
    source: &mut DocumentSource<R>,
    token: &CancellationToken,
    pages: &SharedPages,
    listener: &dyn Fn(RenderProgress),
) {
    let page_count = source.page_count();
    let mut rendered = 0;
    let mut cancelled = false;

    for index in 0..page_count {
        if token.is_cancelled() {
            cancelled = true;
            break;
        }

        let page = match source.render_page(index) {
            Ok(page) => page,
            Err(e) => {
                log::warn!("Skipping {}: {}", page_label(index), e);
                None
            }
        };

        let progress = match &page {
            Some(page) => {
                rendered += 1;
                log::debug!(
                    "Rendered {} ({}x{})",
                    page_label(index),
                    page.width(),
                    page.height()
                );
                RenderProgress::PageReady {
                    index,
                    width: page.width(),
                    height: page.height(),
                }
            }
            None => RenderProgress::PageSkipped { index },
        };

        pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page);
        listener(progress);
    }

    log::info!(
        "Rendered {}/{} pages{}",
        rendered,
        page_count,
        if cancelled { " (cancelled)" } else { "" }
    );
    listener(RenderProgress::Finished {
        rendered,
        cancelled,
    });
}
