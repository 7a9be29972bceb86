// Pagewise - bundled PDF viewer, Tauri backend
//
// This crate renders every page of a bundled PDF on a background worker
// using PDFium and serves the pages and navigation state to the WebView.

pub mod bookmarks;
pub mod commands;
pub mod config;
pub mod pdf;
pub mod viewer;

use commands::{
    close_document, get_bookmarks, get_page, get_viewer_state, jump_to_bookmark, next_page,
    open_document, previous_page, scroll_changed, AppState,
};
use config::{ViewerConfig, CONFIG_FILE_NAME};
use pdf::AssetStore;
use tauri::{AppHandle, Manager, RunEvent, Runtime, WindowEvent};

/// Directory under the resource dir that holds bundled PDFs.
const ASSET_DIR: &str = "assets";

/// Resolve config, asset and scratch locations for this installation.
fn build_state<R: Runtime>(app: &AppHandle<R>) -> Result<AppState, Box<dyn std::error::Error>> {
    let paths = app.path();

    let config_path = paths.app_config_dir()?.join(CONFIG_FILE_NAME);
    let config = ViewerConfig::load_or_default(&config_path);
    log::info!("Viewer config: {:?}", config);

    let assets = AssetStore::new(paths.resource_dir()?.join(ASSET_DIR));
    log::debug!("Bundled assets in {:?}", assets.root());

    let scratch_dir = paths.app_cache_dir()?;
    std::fs::create_dir_all(&scratch_dir)?;
    pdf::purge_stale_scratch(&scratch_dir);

    Ok(AppState::new(config, assets, scratch_dir))
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let app = tauri::Builder::default()
        .setup(|app| {
            let state = build_state(app.handle())?;
            app.manage(state);
            log::info!("App setup complete");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            open_document,
            get_viewer_state,
            get_page,
            get_bookmarks,
            next_page,
            previous_page,
            jump_to_bookmark,
            scroll_changed,
            close_document,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| match event {
        RunEvent::WindowEvent {
            event: WindowEvent::Destroyed,
            ..
        }
        | RunEvent::Exit => {
            if let Some(state) = app_handle.try_state::<AppState>() {
                if state.teardown() {
                    log::info!("Released document");
                }
            }
        }
        _ => {}
    });
}
