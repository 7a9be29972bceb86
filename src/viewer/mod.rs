//! Viewer session: eager background rendering plus navigation state.
//!
//! A session owns the render worker for one document. The webview never talks
//! to the document source directly; it reads rendered pages from the shared
//! page store and drives navigation through the session.

mod navigation;
mod worker;

pub use navigation::{Navigator, ScrollRequest};
pub use worker::{
    CancellationToken, LoadRequest, OpenReport, PageStore, RenderProgress, SharedPages,
};

use crate::bookmarks::{Bookmark, BookmarkMap, BookmarkSource};
use crate::pdf::{PdfError, RenderedPage, RendererFactory};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use worker::{OpenReceiver, RenderJob};

/// Accessible name for a page, 1-based.
pub fn page_label(index: u32) -> String {
    format!("Page {}", index + 1)
}

#[derive(Debug)]
pub enum LoadStatus {
    Ready { page_count: u32 },
    Failed(PdfError),
}

/// Serializable view of a session for the webview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSnapshot {
    pub document: String,
    pub page_count: u32,
    pub current_page: u32,
    pub processed_pages: u32,
    pub rendering: bool,
    pub can_go_previous: bool,
    pub can_go_next: bool,
    pub active_bookmark: Option<Bookmark>,
    pub error: Option<String>,
}

/// A session whose worker has started but not yet reported the open result.
pub struct PendingSession {
    document: String,
    opened: OpenReceiver,
    job: RenderJob,
    pages: SharedPages,
    bookmark_source: Box<dyn BookmarkSource>,
}

impl PendingSession {
    /// Wait for the document to open.
    pub async fn ready(self) -> ViewerSession {
        let PendingSession {
            document,
            opened,
            job,
            pages,
            bookmark_source,
        } = self;
        let report = opened.await.unwrap_or(Err(PdfError::WorkerExited));
        ViewerSession::from_report(document, report, job, pages, bookmark_source.as_ref())
    }

    /// Blocking variant of [`PendingSession::ready`]. Must not be called
    /// from inside an async runtime.
    pub fn wait(self) -> ViewerSession {
        let PendingSession {
            document,
            opened,
            job,
            pages,
            bookmark_source,
        } = self;
        let report = opened.blocking_recv().unwrap_or(Err(PdfError::WorkerExited));
        ViewerSession::from_report(document, report, job, pages, bookmark_source.as_ref())
    }
}

pub struct ViewerSession {
    document: String,
    status: LoadStatus,
    navigator: Navigator,
    bookmarks: BookmarkMap,
    pages: SharedPages,
    job: Option<RenderJob>,
}

impl ViewerSession {
    /// Start loading `request.document` on a background worker.
    ///
    /// `make_factory` binds the renderer backend on the worker thread.
    /// `listener` is called from the worker for every page and once at the end.
    pub fn start<B, F, L>(
        request: LoadRequest,
        make_factory: B,
        bookmark_source: Box<dyn BookmarkSource>,
        listener: L,
    ) -> Result<PendingSession, PdfError>
    where
        B: FnOnce() -> Result<F, PdfError> + Send + 'static,
        F: RendererFactory + 'static,
        L: Fn(RenderProgress) + Send + 'static,
    {
        let document = request.document.clone();
        let pages: SharedPages = Arc::new(Mutex::new(PageStore::default()));
        let (opened, job) = worker::spawn(request, make_factory, pages.clone(), listener)?;

        Ok(PendingSession {
            document,
            opened,
            job,
            pages,
            bookmark_source,
        })
    }

    fn from_report(
        document: String,
        report: Result<OpenReport, PdfError>,
        mut job: RenderJob,
        pages: SharedPages,
        bookmark_source: &dyn BookmarkSource,
    ) -> Self {
        match report {
            Ok(report) => {
                let bookmarks = bookmark_source.bookmarks(&report.outline, report.page_count);
                log::info!(
                    "{}: {} pages, {} bookmarks",
                    document,
                    report.page_count,
                    bookmarks.len()
                );
                Self {
                    document,
                    status: LoadStatus::Ready {
                        page_count: report.page_count,
                    },
                    navigator: Navigator::new(report.page_count),
                    bookmarks,
                    pages,
                    job: Some(job),
                }
            }
            Err(e) => {
                log::error!("Failed to open {}: {}", document, e);
                // The worker exits right after reporting the failure.
                job.join();
                Self {
                    document,
                    status: LoadStatus::Failed(e),
                    navigator: Navigator::new(0),
                    bookmarks: BookmarkMap::default(),
                    pages,
                    job: None,
                }
            }
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn load_error(&self) -> Option<&PdfError> {
        match &self.status {
            LoadStatus::Failed(e) => Some(e),
            LoadStatus::Ready { .. } => None,
        }
    }

    /// Page count; 0 when the document failed to open.
    pub fn page_count(&self) -> u32 {
        self.navigator.page_count()
    }

    pub fn current_page(&self) -> u32 {
        self.navigator.current()
    }

    pub fn bookmarks(&self) -> &BookmarkMap {
        &self.bookmarks
    }

    /// Bookmark of the section containing the current page.
    pub fn active_bookmark(&self) -> Option<Bookmark> {
        if self.page_count() == 0 {
            return None;
        }
        self.bookmarks.section_for(self.current_page())
    }

    pub fn next(&mut self) -> Option<ScrollRequest> {
        self.navigator.next()
    }

    pub fn previous(&mut self) -> Option<ScrollRequest> {
        self.navigator.previous()
    }

    /// Bookmark click. Pages without a bookmark are ignored.
    pub fn jump_to_bookmark(&mut self, page: u32) -> Option<ScrollRequest> {
        if !self.bookmarks.contains(page) {
            return None;
        }
        self.navigator.jump_to(page)
    }

    /// The strip reports `visible` as the page in view.
    pub fn scroll_changed(&mut self, visible: u32) -> bool {
        self.navigator.sync_from_scroll(visible)
    }

    pub fn is_rendering(&self) -> bool {
        self.job.as_ref().is_some_and(|job| !job.is_finished())
    }

    /// Pages processed so far, including ones that failed to render.
    pub fn processed_pages(&self) -> u32 {
        self.lock_pages().len() as u32
    }

    /// Run `f` against a rendered page, if it is available.
    pub fn with_page<T>(&self, index: u32, f: impl FnOnce(&RenderedPage) -> T) -> Option<T> {
        self.lock_pages().get(index).map(f)
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            document: self.document.clone(),
            page_count: self.page_count(),
            current_page: self.current_page(),
            processed_pages: self.processed_pages(),
            rendering: self.is_rendering(),
            can_go_previous: self.navigator.can_go_previous(),
            can_go_next: self.navigator.can_go_next(),
            active_bookmark: self.active_bookmark(),
            error: self.load_error().map(ToString::to_string),
        }
    }

    /// Let the worker start rasterizing pages.
    ///
    /// Call once the session is reachable by whoever consumes progress
    /// events, so no page is announced before it can be fetched.
    pub fn begin_rendering(&mut self) {
        if let Some(job) = self.job.as_mut() {
            job.begin();
        }
    }

    /// Ask the worker to stop after the page it is rendering.
    pub fn cancel_rendering(&self) {
        if let Some(job) = &self.job {
            job.cancel();
        }
    }

    /// Block until every page has been processed. Rendering must have been
    /// started with [`ViewerSession::begin_rendering`].
    pub fn wait_for_render(&mut self) {
        if let Some(job) = self.job.as_mut() {
            job.join();
        }
    }

    /// Cancel rendering and wait for the worker, which closes the document
    /// source on its way out. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(mut job) = self.job.take() {
            job.cancel();
            job.join();
            log::info!("Closed {}", self.document);
        }
    }

    fn lock_pages(&self) -> std::sync::MutexGuard<'_, PageStore> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::{OutlineBookmarks, StaticBookmarks};
    use crate::pdf::testing::{write_asset, FakeFactory};
    use crate::pdf::OutlineEntry;
    use crate::pdf::RenderOptions;
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn request(dir: &TempDir) -> LoadRequest {
        LoadRequest {
            assets: write_asset(dir, "test.pdf"),
            document: "test.pdf".into(),
            scratch_dir: dir.path().to_path_buf(),
            options: RenderOptions::default(),
        }
    }

    fn open_session(dir: &TempDir, factory: FakeFactory) -> ViewerSession {
        let mut session = ViewerSession::start(
            request(dir),
            move || Ok(factory),
            Box::new(StaticBookmarks::default()),
            |_| {},
        )
        .unwrap()
        .wait();
        session.begin_rendering();
        session
    }

    #[test]
    fn test_renders_every_page_in_order() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory::with_pages(&[(100.0, 200.0), (300.0, 400.0), (50.0, 60.0)]);
        let counters = factory.counters.clone();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let mut session = ViewerSession::start(
            request(&dir),
            move || Ok(factory),
            Box::new(StaticBookmarks::default()),
            move |progress| sink.lock().unwrap().push(progress),
        )
        .unwrap()
        .wait();
        session.begin_rendering();
        session.wait_for_render();

        assert_eq!(session.page_count(), 3);
        assert_eq!(session.processed_pages(), 3);
        assert_eq!(session.with_page(1, |p| (p.width(), p.height())), Some((300, 400)));
        assert_eq!(session.with_page(3, |p| p.index), None);
        assert!(!session.is_rendering());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            RenderProgress::PageReady {
                index: 0,
                width: 100,
                height: 200
            }
        );
        assert_eq!(
            events[3],
            RenderProgress::Finished {
                rendered: 3,
                cancelled: false
            }
        );

        assert_eq!(counters.renderers_closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.max_live_pages.load(Ordering::SeqCst), 1);
        assert_eq!(counters.live_pages.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_broken_page_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut factory = FakeFactory::with_page_count(3);
        factory.broken_pages = vec![1];

        let mut session = open_session(&dir, factory);
        session.wait_for_render();

        assert_eq!(session.processed_pages(), 3);
        assert!(session.with_page(0, |_| ()).is_some());
        assert!(session.with_page(1, |_| ()).is_none());
        assert!(session.with_page(2, |_| ()).is_some());
    }

    #[test]
    fn test_empty_document() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory::with_page_count(0);
        let counters = factory.counters.clone();

        let mut session = open_session(&dir, factory);
        session.wait_for_render();

        assert_eq!(session.page_count(), 0);
        assert!(session.load_error().is_none());
        assert!(session.bookmarks().is_empty());
        assert_eq!(session.next(), None);
        assert_eq!(session.previous(), None);
        assert_eq!(session.current_page(), 0);
        assert_eq!(counters.pages_opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bookmark_click_scrolls_to_page() {
        let dir = TempDir::new().unwrap();
        let mut session = open_session(&dir, FakeFactory::with_page_count(15));

        let pages: Vec<u32> = session.bookmarks().to_vec().iter().map(|b| b.page).collect();
        assert_eq!(pages, vec![0, 4, 9, 13]);

        let scroll = session.jump_to_bookmark(9);
        assert_eq!(scroll, Some(ScrollRequest { index: 9, smooth: true }));
        assert_eq!(session.current_page(), 9);
        assert_eq!(session.active_bookmark().unwrap().label, "Connectivity");

        assert_eq!(session.jump_to_bookmark(7), None);
        assert_eq!(session.current_page(), 9);
    }

    #[test]
    fn test_next_at_last_page_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut session = open_session(&dir, FakeFactory::with_page_count(15));

        session.jump_to_bookmark(13);
        assert_eq!(session.next().map(|s| s.index), Some(14));
        assert_eq!(session.next(), None);
        assert_eq!(session.current_page(), 14);
        assert!(!session.snapshot().can_go_next);
    }

    #[test]
    fn test_scroll_updates_active_bookmark() {
        let dir = TempDir::new().unwrap();
        let mut session = open_session(&dir, FakeFactory::with_page_count(15));

        assert!(session.scroll_changed(5));
        assert_eq!(session.current_page(), 5);
        assert_eq!(
            session.active_bookmark().unwrap().label,
            "Technical Specifications"
        );
        assert_eq!(session.previous().map(|s| s.index), Some(4));
    }

    #[test]
    fn test_missing_asset_fails_gracefully() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory::with_page_count(4);
        let counters = factory.counters.clone();
        let mut request = request(&dir);
        request.document = "absent.pdf".into();

        let mut session = ViewerSession::start(
            request,
            move || Ok(factory),
            Box::new(StaticBookmarks::default()),
            |_| {},
        )
        .unwrap()
        .wait();

        assert!(matches!(
            session.load_error(),
            Some(PdfError::AssetNotFound(_))
        ));
        assert_eq!(session.page_count(), 0);
        assert_eq!(session.next(), None);
        assert!(session.bookmarks().is_empty());
        assert!(session.snapshot().error.is_some());
        assert_eq!(counters.renderers_opened.load(Ordering::SeqCst), 0);
        session.close();
    }

    #[test]
    fn test_backend_bind_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let session = ViewerSession::start(
            request(&dir),
            || Err::<FakeFactory, _>(PdfError::InitError("no library".into())),
            Box::new(StaticBookmarks::default()),
            |_| {},
        )
        .unwrap()
        .wait();

        assert!(matches!(session.load_error(), Some(PdfError::InitError(_))));
        assert_eq!(session.page_count(), 0);
    }

    #[test]
    fn test_outline_bookmarks_come_from_document() {
        let dir = TempDir::new().unwrap();
        let mut factory = FakeFactory::with_page_count(6);
        factory.outline = vec![
            OutlineEntry {
                page: 0,
                title: "Cover".into(),
            },
            OutlineEntry {
                page: 3,
                title: "Specs".into(),
            },
        ];

        let session = ViewerSession::start(
            request(&dir),
            move || Ok(factory),
            Box::new(OutlineBookmarks),
            |_| {},
        )
        .unwrap()
        .wait();

        assert_eq!(session.bookmarks().label(3), Some("Specs"));
        assert_eq!(session.bookmarks().len(), 2);
    }

    #[test]
    fn test_close_mid_render_closes_source_once() {
        let dir = TempDir::new().unwrap();
        let (gate_tx, gate_rx) = mpsc::channel();
        let factory = FakeFactory::with_page_count(50).gated(gate_rx);
        let counters = factory.counters.clone();

        let mut session = open_session(&dir, factory);
        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();

        session.cancel_rendering();
        drop(gate_tx);
        session.close();
        session.close();

        assert!(session.processed_pages() <= 3);
        assert!(!session.is_rendering());
        assert_eq!(counters.renderers_opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.renderers_closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.live_pages.load(Ordering::SeqCst), 0);

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("pagewise-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_drop_closes_session() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory::with_page_count(5);
        let counters = factory.counters.clone();

        drop(open_session(&dir, factory));

        assert_eq!(counters.renderers_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ready_resolves_asynchronously() {
        let dir = TempDir::new().unwrap();
        let pending = ViewerSession::start(
            request(&dir),
            move || Ok(FakeFactory::with_page_count(2)),
            Box::new(StaticBookmarks::default()),
            |_| {},
        )
        .unwrap();

        let mut session = pending.ready().await;
        session.begin_rendering();
        assert_eq!(session.page_count(), 2);
        assert_eq!(session.snapshot().document, "test.pdf");
        session.close();
    }

    #[test]
    fn test_no_page_is_announced_before_rendering_begins() {
        let dir = TempDir::new().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let mut session = ViewerSession::start(
            request(&dir),
            move || Ok(FakeFactory::with_page_count(15)),
            Box::new(StaticBookmarks::default()),
            move |progress| sink.lock().unwrap().push(progress),
        )
        .unwrap()
        .wait();
        std::thread::sleep(std::time::Duration::from_millis(100));

        assert_eq!(session.page_count(), 15);
        assert_eq!(session.processed_pages(), 0);
        assert!(events.lock().unwrap().is_empty());

        session.begin_rendering();
        session.wait_for_render();

        assert_eq!(session.processed_pages(), 15);
        assert_eq!(events.lock().unwrap().len(), 16);
        assert!(session.with_page(0, |p| p.index).is_some());
    }

    #[test]
    fn test_close_before_rendering_begins() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory::with_page_count(5);
        let counters = factory.counters.clone();

        let mut session = ViewerSession::start(
            request(&dir),
            move || Ok(factory),
            Box::new(StaticBookmarks::default()),
            |_| {},
        )
        .unwrap()
        .wait();
        session.close();

        assert_eq!(session.processed_pages(), 0);
        assert_eq!(counters.pages_opened.load(Ordering::SeqCst), 0);
        assert_eq!(counters.renderers_closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_page_label_is_one_based() {
        assert_eq!(page_label(0), "Page 1");
        assert_eq!(page_label(14), "Page 15");
    }
}
