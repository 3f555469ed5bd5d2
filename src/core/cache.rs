//! Build cache
//!
//! Tracks, per backend, the fingerprint of every file that compiled
//! successfully. A file is skipped only when it and everything ordered before it
//! in the current plan are clean. Entries are written one at a time, right
//! after each successful compile.
//!
//! Every entry carries a generation number taken from a counter that only
//! grows. A skipped file whose generation is older than an upstream entry was
//! compiled before that upstream file was last rebuilt, so it is rebuilt too.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::plan::{BuildAction, BuildPlan, BuildReason, FilteredPlan, PlannedFile};
use crate::error::CacheError;

/// Outcome of the build that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Compiled cleanly
    Passed,
    /// Compiled with warnings
    PassedWithWarnings,
}

/// Last successful compile of one file for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 of the file contents, hex encoded
    pub fingerprint: String,
    /// Outcome of the compile
    pub outcome: BuildOutcome,
    /// When the entry was written
    pub recorded_at: DateTime<Utc>,
    /// Position in the global record sequence
    pub generation: u64,
}

/// Entire cache contents: backend → path → entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Generation assigned to the next record
    pub next_generation: u64,
    /// Entries grouped by backend
    pub entries: BTreeMap<String, BTreeMap<PathBuf, CacheEntry>>,
}

/// Persistence backend for the build cache
pub trait CacheStore: Send {
    /// Load the stored snapshot; `Ok(None)` when nothing was stored yet
    ///
    /// # Errors
    ///
    /// `CacheError::Corrupt` when stored data cannot be trusted.
    fn load(&mut self) -> Result<Option<CacheSnapshot>, CacheError>;

    /// Replace the stored snapshot
    fn save(&mut self, snapshot: &CacheSnapshot) -> Result<(), CacheError>;

    /// Delete everything stored
    fn clear(&mut self) -> Result<(), CacheError>;
}

/// In-memory store; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<Mutex<Option<CacheSnapshot>>>,
}

impl MemoryCacheStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored snapshot, if any
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.inner.lock().ok().and_then(|guard| guard.clone())
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&mut self) -> Result<Option<CacheSnapshot>, CacheError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().map_err(|e| CacheError::Io {
            path: PathBuf::from("<memory>"),
            error: e.to_string(),
        })?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().map_err(|e| CacheError::Io {
            path: PathBuf::from("<memory>"),
            error: e.to_string(),
        })?;
        *guard = None;
        Ok(())
    }
}

/// Compute the content fingerprint of a file
pub fn fingerprint(path: &Path) -> Result<String, CacheError> {
    let content = std::fs::read(path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

/// Build cache backed by a [`CacheStore`]
pub struct BuildCache {
    store: Box<dyn CacheStore>,
    snapshot: CacheSnapshot,
}

impl std::fmt::Debug for BuildCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCache")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl BuildCache {
    /// Open a cache, discarding corrupt or incompatible stored data
    ///
    /// # Errors
    ///
    /// Only IO failures that are not corruption are returned.
    pub fn open(mut store: Box<dyn CacheStore>) -> Result<Self, CacheError> {
        let snapshot = match store.load() {
            Ok(Some(snapshot)) => {
                tracing::debug!("Loaded build cache ({} backends)", snapshot.entries.len());
                snapshot
            }
            Ok(None) => CacheSnapshot::default(),
            Err(CacheError::Corrupt { path, reason }) => {
                tracing::warn!(
                    "Build cache at {} is unusable ({reason}); starting empty",
                    path.display()
                );
                if let Err(e) = store.clear() {
                    tracing::warn!("Failed to remove unusable build cache: {e}");
                }
                CacheSnapshot::default()
            }
            Err(e) => return Err(e),
        };

        Ok(Self { store, snapshot })
    }

    /// Open an empty in-memory cache
    pub fn in_memory() -> Self {
        Self {
            store: Box::new(MemoryCacheStore::new()),
            snapshot: CacheSnapshot::default(),
        }
    }

    /// Mark each planned file build or skip for `backend`
    ///
    /// Skipping is transitive along the plan: once a file must be rebuilt, so
    /// must every file after it.
    pub fn filter(&self, plan: &BuildPlan, backend: &str) -> FilteredPlan {
        self.filter_with(plan, backend, |_| true)
    }

    /// [`BuildCache::filter`], also rebuilding libraries for which
    /// `library_present` is false even when their files are unchanged
    pub fn filter_with(
        &self,
        plan: &BuildPlan,
        backend: &str,
        library_present: impl Fn(&str) -> bool,
    ) -> FilteredPlan {
        let entries = self.snapshot.entries.get(backend);
        let mut present: BTreeMap<&str, bool> = BTreeMap::new();
        let mut upstream_rebuilt = false;
        let mut newest_upstream = 0;
        let mut planned = Vec::with_capacity(plan.len());

        for file in plan.files() {
            let current = match fingerprint(&file.path) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    tracing::warn!("Cannot fingerprint {}: {e}", file.path.display());
                    None
                }
            };
            let entry = entries.and_then(|e| e.get(&file.path));
            let library_ok = *present
                .entry(file.library.as_str())
                .or_insert_with(|| library_present(&file.library));

            let action = match (&current, entry) {
                (None, _) => BuildAction::Build(BuildReason::Unreadable),
                (Some(_), None) => BuildAction::Build(BuildReason::NotCached),
                (Some(fp), Some(entry)) if *fp != entry.fingerprint => {
                    BuildAction::Build(BuildReason::Changed)
                }
                _ if !library_ok => BuildAction::Build(BuildReason::LibraryMissing),
                _ if upstream_rebuilt => BuildAction::Build(BuildReason::UpstreamRebuilt),
                (Some(_), Some(entry)) if entry.generation < newest_upstream => {
                    BuildAction::Build(BuildReason::UpstreamNewer)
                }
                (Some(_), Some(entry)) => {
                    newest_upstream = newest_upstream.max(entry.generation);
                    BuildAction::Skip
                }
            };

            match action {
                BuildAction::Build(reason) => {
                    upstream_rebuilt = true;
                    tracing::debug!("Build {} ({reason})", file.display_name());
                }
                BuildAction::Skip => tracing::debug!("Skip {} (unchanged)", file.display_name()),
            }

            planned.push(PlannedFile {
                file: file.clone(),
                action,
                fingerprint: current,
            });
        }

        FilteredPlan::new(planned)
    }

    /// Whether a single file is unchanged since its last recorded compile
    ///
    /// Does not consider upstream files; use [`BuildCache::filter`] for plans.
    pub fn is_unchanged(&self, backend: &str, path: &Path) -> bool {
        match (self.entry(backend, path), fingerprint(path)) {
            (Some(entry), Ok(fp)) => entry.fingerprint == fp,
            _ => false,
        }
    }

    /// Record a successful compile and persist immediately
    pub fn record(
        &mut self,
        backend: &str,
        path: &Path,
        fingerprint: String,
        outcome: BuildOutcome,
    ) -> Result<(), CacheError> {
        self.snapshot.next_generation += 1;
        let entry = CacheEntry {
            fingerprint,
            outcome,
            recorded_at: Utc::now(),
            generation: self.snapshot.next_generation,
        };
        self.snapshot
            .entries
            .entry(backend.to_string())
            .or_default()
            .insert(path.to_path_buf(), entry);
        self.store.save(&self.snapshot)
    }

    /// Drop the entry for a file so it is rebuilt next time
    pub fn invalidate(&mut self, backend: &str, path: &Path) -> Result<(), CacheError> {
        let removed = self
            .snapshot
            .entries
            .get_mut(backend)
            .and_then(|e| e.remove(path))
            .is_some();
        if removed {
            tracing::debug!("Invalidated cache entry for {}", path.display());
            self.store.save(&self.snapshot)?;
        }
        Ok(())
    }

    /// Delete every entry
    pub fn clear(&mut self) -> Result<(), CacheError> {
        tracing::info!("Clearing build cache");
        self.snapshot = CacheSnapshot::default();
        self.store.clear()
    }

    /// Entry for a file under a backend
    pub fn entry(&self, backend: &str, path: &Path) -> Option<&CacheEntry> {
        self.snapshot.entries.get(backend)?.get(path)
    }

    /// Every entry as (backend, path, entry)
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Path, &CacheEntry)> {
        self.snapshot.entries.iter().flat_map(|(backend, files)| {
            files
                .iter()
                .map(move |(path, entry)| (backend.as_str(), path.as_path(), entry))
        })
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.snapshot.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether the cache has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
