//! Tauri commands for the viewer.
//!
//! These commands expose the viewer session to the WebView frontend via IPC.
//!
//! Note: pdfium-render's Pdfium struct is not Send+Sync, so it never enters
//! app state. The session's render worker binds it on its own thread; state
//! only holds the session and the rendered pages.

use crate::bookmarks::Bookmark;
use crate::config::ViewerConfig;
use crate::pdf::{AssetStore, PdfError, PdfiumFactory};
use crate::viewer::{LoadRequest, RenderProgress, ScrollRequest, ViewerSession, ViewerSnapshot};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tauri::{AppHandle, Emitter, Manager, Runtime, State};

pub const EVENT_PAGE_RENDERED: &str = "page-rendered";
pub const EVENT_RENDER_FINISHED: &str = "render-finished";
pub const EVENT_SCROLL_TO_PAGE: &str = "scroll-to-page";

/// Application state holding the active viewer session.
pub struct AppState {
    config: ViewerConfig,
    assets: AssetStore,
    scratch_dir: PathBuf,
    session: Mutex<Option<ViewerSession>>,
}

impl AppState {
    pub fn new(config: ViewerConfig, assets: AssetStore, scratch_dir: PathBuf) -> Self {
        Self {
            config,
            assets,
            scratch_dir,
            session: Mutex::new(None),
        }
    }

    fn load_request(&self) -> LoadRequest {
        LoadRequest {
            assets: self.assets.clone(),
            document: self.config.document.clone(),
            scratch_dir: self.scratch_dir.clone(),
            options: self.config.render_options(),
        }
    }

    /// Install `session`, closing whatever it replaces, then start rendering.
    ///
    /// Rendering starts only once the session is reachable through
    /// [`AppState::with_session`], so every announced page can be fetched.
    fn install(&self, session: ViewerSession) {
        let previous = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session);
        if let Some(mut previous) = previous {
            previous.close();
        }
        if let Some(session) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            session.begin_rendering();
        }
    }

    /// Close the active session, if any. Returns whether one was open.
    pub fn teardown(&self) -> bool {
        // Take it out first so the worker is joined without holding the lock.
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match session {
            Some(mut session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut ViewerSession) -> T) -> Result<T, String> {
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let session = guard
            .as_mut()
            .ok_or_else(|| PdfError::NoDocument.to_string())?;
        Ok(f(session))
    }
}

fn emit_progress<R: Runtime>(app: &AppHandle<R>, progress: RenderProgress) {
    let event = match progress {
        RenderProgress::Finished { .. } => EVENT_RENDER_FINISHED,
        _ => EVENT_PAGE_RENDERED,
    };
    if let Err(e) = app.emit(event, progress) {
        log::warn!("Failed to emit {}: {}", event, e);
    }
}

/// Close the active session on a blocking thread. Joining the render worker
/// can take as long as the page it is rasterizing.
async fn teardown_in_background<R: Runtime>(app: &AppHandle<R>) -> Result<bool, String> {
    let app = app.clone();
    tauri::async_runtime::spawn_blocking(move || app.state::<AppState>().teardown())
        .await
        .map_err(|e| e.to_string())
}

fn emit_scroll<R: Runtime>(app: &AppHandle<R>, scroll: Option<ScrollRequest>) {
    if let Some(scroll) = scroll {
        if let Err(e) = app.emit(EVENT_SCROLL_TO_PAGE, scroll) {
            log::warn!("Failed to emit {}: {}", EVENT_SCROLL_TO_PAGE, e);
        }
    }
}

/// Open the configured bundled document and start rendering it.
///
/// Resolves once the document is open; rendering starts after the session is
/// installed and pages arrive through `page-rendered` events. On failure the session stays installed with no
/// pages and the error is returned.
#[tauri::command]
pub async fn open_document(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<ViewerSnapshot, String> {
    teardown_in_background(&app).await?;

    let emitter = app.clone();
    let pending = ViewerSession::start(
        state.load_request(),
        PdfiumFactory::bind,
        state.config.bookmarks.source(),
        move |progress| emit_progress(&emitter, progress),
    )
    .map_err(|e| e.to_string())?;

    let session = pending.ready().await;
    let snapshot = session.snapshot();
    state.install(session);

    match snapshot.error.clone() {
        Some(error) => Err(error),
        None => Ok(snapshot),
    }
}

#[tauri::command]
pub fn get_viewer_state(state: State<AppState>) -> Result<ViewerSnapshot, String> {
    state.with_session(|session| session.snapshot())
}

/// Get a rendered page as PNG bytes.
#[tauri::command]
pub fn get_page(page_index: u32, state: State<AppState>) -> Result<Vec<u8>, String> {
    state
        .with_session(|session| session.with_page(page_index, |page| page.to_png()))?
        .unwrap_or(Err(PdfError::InvalidPage(page_index)))
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_bookmarks(state: State<AppState>) -> Result<Vec<Bookmark>, String> {
    state.with_session(|session| session.bookmarks().to_vec())
}

#[tauri::command]
pub fn next_page(app: AppHandle, state: State<AppState>) -> Result<ViewerSnapshot, String> {
    let (scroll, snapshot) = state.with_session(|session| (session.next(), session.snapshot()))?;
    emit_scroll(&app, scroll);
    Ok(snapshot)
}

#[tauri::command]
pub fn previous_page(app: AppHandle, state: State<AppState>) -> Result<ViewerSnapshot, String> {
    let (scroll, snapshot) =
        state.with_session(|session| (session.previous(), session.snapshot()))?;
    emit_scroll(&app, scroll);
    Ok(snapshot)
}

#[tauri::command]
pub fn jump_to_bookmark(
    page_index: u32,
    app: AppHandle,
    state: State<AppState>,
) -> Result<ViewerSnapshot, String> {
    let (scroll, snapshot) = state.with_session(|session| {
        (session.jump_to_bookmark(page_index), session.snapshot())
    })?;
    emit_scroll(&app, scroll);
    Ok(snapshot)
}

/// The page strip reports which page is in view.
#[tauri::command]
pub fn scroll_changed(visible_index: u32, state: State<AppState>) -> Result<ViewerSnapshot, String> {
    state.with_session(|session| {
        session.scroll_changed(visible_index);
        session.snapshot()
    })
}

/// Close the document and free its resources.
#[tauri::command]
pub async fn close_document(app: AppHandle) -> Result<(), String> {
    teardown_in_background(&app).await?;
    Ok(())
}
