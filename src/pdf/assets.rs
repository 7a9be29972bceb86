//! Read-only access to PDFs shipped with the application bundle.

use super::PdfError;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

/// A directory of bundled assets, addressed by plain file name.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an asset name to its path inside the store.
    ///
    /// Names that would escape the store (absolute paths, `..`) are treated
    /// as missing.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, PdfError> {
        let relative = Path::new(name);
        let contained = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(PdfError::AssetNotFound(name.to_string()));
        }

        let path = self.root.join(relative);
        if path.is_file() {
            Ok(path)
        } else {
            Err(PdfError::AssetNotFound(name.to_string()))
        }
    }

    pub fn open(&self, name: &str) -> Result<File, PdfError> {
        let path = self.resolve(name)?;
        Ok(File::open(path)?)
    }
}
