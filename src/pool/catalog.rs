use std::{fs, path::PathBuf};

use crate::db::models::CatalogEntry;
use crate::error::{CoreError, CoreResult};

/// Where the pool learns which datasets exist.
///
/// Implementations are called from the blocking pool and may touch the disk.
pub trait CatalogSource: Send + Sync {
    /// Every dataset currently available, sorted by name.
    fn entries(&self) -> CoreResult<Vec<CatalogEntry>>;
}

/// Files with a given extension in one directory, not recursive.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    dir: PathBuf,
    extension: String,
}

impl DirectoryCatalog {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn matches(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

impl CatalogSource for DirectoryCatalog {
    fn entries(&self) -> CoreResult<Vec<CatalogEntry>> {
        let unavailable = |err: std::io::Error| CoreError::SourceUnavailable {
            path: self.dir.clone(),
            reason: err.to_string(),
        };

        let mut entries = Vec::new();
        for item in fs::read_dir(&self.dir).map_err(unavailable)? {
            let item = item.map_err(unavailable)?;
            let path = item.path();
            if !path.is_file() || !self.matches(&path) {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            entries.push(CatalogEntry { name, path });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Fixed in-memory catalog, for embedding apps that track datasets elsewhere.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    pub fn new(mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }
}

impl CatalogSource for StaticCatalog {
    fn entries(&self) -> CoreResult<Vec<CatalogEntry>> {
        Ok(self.entries.clone())
    }
}
