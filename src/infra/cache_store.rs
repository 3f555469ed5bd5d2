//! JSON file persistence for the build cache
//!
//! Layout: `{ "version": N, "next_generation": G, "entries": { backend: { path: entry } } }`.
//! Writes go through a temporary file in the same directory followed by a rename,
//! so a crash mid-write leaves the previous contents intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults::CACHE_SCHEMA_VERSION;
use crate::core::cache::{CacheEntry, CacheSnapshot, CacheStore};
use crate::error::CacheError;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    next_generation: u64,
    entries: BTreeMap<String, BTreeMap<PathBuf, CacheEntry>>,
}

/// Minimal header read before trusting the rest of the file
#[derive(Deserialize)]
struct VersionProbe {
    version: Option<u32>,
}

/// Build cache stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    /// Store backed by `path`; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> CacheError {
        CacheError::Corrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn io(&self, error: &std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            error: error.to_string(),
        }
    }
}

impl CacheStore for JsonFileCacheStore {
    fn load(&mut self) -> Result<Option<CacheSnapshot>, CacheError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read(&self.path).map_err(|e| self.io(&e))?;

        let probe: VersionProbe =
            serde_json::from_slice(&content).map_err(|e| self.corrupt(e.to_string()))?;
        match probe.version {
            Some(CACHE_SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(self.corrupt(format!(
                    "schema version {other}, expected {CACHE_SCHEMA_VERSION}"
                )))
            }
            None => return Err(self.corrupt("missing schema version")),
        }

        let file: CacheFile =
            serde_json::from_slice(&content).map_err(|e| self.corrupt(e.to_string()))?;
        Ok(Some(CacheSnapshot {
            next_generation: file.next_generation,
            entries: file.entries,
        }))
    }

    fn save(&mut self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io(&e))?;
        }

        let file = CacheFile {
            version: CACHE_SCHEMA_VERSION,
            next_generation: snapshot.next_generation,
            entries: snapshot.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| self.io(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io(&e))
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io(&e)),
        }
    }
}
