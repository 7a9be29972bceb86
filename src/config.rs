//! Viewer configuration, read from `pagewise.json` in the app config directory.

use crate::bookmarks::{BookmarkSource, OutlineBookmarks, StaticBookmarks};
use crate::pdf::{RenderOptions, RenderQuality};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "pagewise.json";

const MIN_RENDER_SCALE: f32 = 0.1;
const MAX_RENDER_SCALE: f32 = 8.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Where the navigation menu gets its entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkSourceKind {
    #[default]
    Static,
    Outline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookmarkConfig {
    pub source: BookmarkSourceKind,
    /// Used by the static source only
    pub entries: BTreeMap<u32, String>,
}

impl Default for BookmarkConfig {
    fn default() -> Self {
        Self {
            source: BookmarkSourceKind::Static,
            entries: StaticBookmarks::placeholder(),
        }
    }
}

impl BookmarkConfig {
    pub fn source(&self) -> Box<dyn BookmarkSource> {
        match self.source {
            BookmarkSourceKind::Static => Box::new(StaticBookmarks::new(self.entries.clone())),
            BookmarkSourceKind::Outline => Box::new(OutlineBookmarks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Bundled asset to open
    pub document: String,
    /// Pixels per point
    pub render_scale: f32,
    pub quality: RenderQuality,
    pub bookmarks: BookmarkConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            document: "test.pdf".to_string(),
            render_scale: 1.0,
            quality: RenderQuality::Display,
            bookmarks: BookmarkConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`ViewerConfig::load`], but falls back to defaults on error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        let scale = if self.render_scale.is_finite() {
            self.render_scale.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE)
        } else {
            1.0
        };
        RenderOptions {
            scale,
            quality: self.quality,
        }
    }
}
