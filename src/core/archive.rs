//! Archive management
//!
//! Packages the outputs of an operation into a uniquely named directory under
//! the archive root. Bundles are never overwritten: a numeric suffix is added
//! when a name is already taken.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::defaults::{ARCHIVE_ERROR_PREFIX, ARCHIVE_TIMESTAMP_FORMAT, DEFAULT_PROJECT_ID};
use crate::core::tool::{Operation, ToolResult};
use crate::error::ArchiveError;
use crate::infra::filesystem;

/// Captured tool output files written into every bundle
const LOG_FILES: [&str; 2] = ["stdout.log", "stderr.log"];

/// A written bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    /// Bundle directory name
    pub name: String,
    /// Bundle directory
    pub path: PathBuf,
    /// Copied artifacts, as paths inside the bundle
    pub artifacts: Vec<PathBuf>,
    /// Requested artifacts that did not exist
    pub missing: Vec<PathBuf>,
}

/// Writes bundles under a root directory
#[derive(Debug, Clone)]
pub struct ArchiveManager {
    root: PathBuf,
}

impl ArchiveManager {
    /// Manager writing under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archive root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bundle name for the given parts, without collision suffix
    pub fn bundle_name(
        operation: Operation,
        project_id: &str,
        succeeded: bool,
        timestamp: &str,
    ) -> String {
        let project = sanitize(project_id);
        let base = format!("{project}_{operation}_{timestamp}");
        if succeeded {
            base
        } else {
            format!("{ARCHIVE_ERROR_PREFIX}_{base}")
        }
    }

    /// Copy `artifacts` and the captured tool output into a new bundle
    ///
    /// Missing artifacts are listed in the record rather than failing.
    pub fn archive(
        &self,
        operation: Operation,
        project_id: &str,
        succeeded: bool,
        artifacts: &[PathBuf],
        result: Option<&ToolResult>,
    ) -> Result<ArchiveRecord, ArchiveError> {
        let timestamp = Local::now().format(ARCHIVE_TIMESTAMP_FORMAT).to_string();
        self.archive_at(operation, project_id, succeeded, artifacts, result, &timestamp)
    }

    /// [`ArchiveManager::archive`] with an explicit timestamp
    pub fn archive_at(
        &self,
        operation: Operation,
        project_id: &str,
        succeeded: bool,
        artifacts: &[PathBuf],
        result: Option<&ToolResult>,
        timestamp: &str,
    ) -> Result<ArchiveRecord, ArchiveError> {
        let base = Self::bundle_name(operation, project_id, succeeded, timestamp);
        let (name, path) = self.create_unique(&base)?;

        let mut record = ArchiveRecord {
            name,
            path: path.clone(),
            artifacts: Vec::new(),
            missing: Vec::new(),
        };

        let mut taken: HashSet<OsString> = LOG_FILES.iter().map(OsString::from).collect();
        for artifact in artifacts {
            let Some(file_name) = artifact.file_name() else {
                record.missing.push(artifact.clone());
                continue;
            };
            let dest = path.join(unique_entry(&mut taken, Path::new(file_name)));
            if artifact.is_file() {
                filesystem::copy_file(artifact, &dest).map_err(|e| write_error(&dest, &e))?;
            } else if artifact.is_dir() {
                filesystem::copy_dir_recursive(artifact, &dest)
                    .map_err(|e| write_error(&dest, &e))?;
            } else {
                tracing::warn!("Artifact {} not found; not archived", artifact.display());
                record.missing.push(artifact.clone());
                continue;
            }
            record.artifacts.push(dest);
        }

        if let Some(result) = result {
            for (file, text) in LOG_FILES.into_iter().zip([&result.stdout, &result.stderr]) {
                let dest = path.join(file);
                filesystem::write_file(&dest, text).map_err(|e| write_error(&dest, &e))?;
            }
        }

        tracing::info!("Archived {} output to {}", operation, path.display());
        Ok(record)
    }

    fn create_unique(&self, base: &str) -> Result<(String, PathBuf), ArchiveError> {
        filesystem::create_dir_all(&self.root).map_err(|e| write_error(&self.root, &e))?;

        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                base.to_string()
            } else {
                format!("{base}_{suffix}")
            };
            let path = self.root.join(&name);
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok((name, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(write_error(&path, &e)),
            }
        }
    }
}

fn write_error(path: &Path, error: &dyn std::fmt::Display) -> ArchiveError {
    ArchiveError::Write {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

/// Bundle entry name for `file_name`, suffixed `_N` before the extension when taken
fn unique_entry(taken: &mut HashSet<OsString>, file_name: &Path) -> OsString {
    let mut candidate = file_name.as_os_str().to_os_string();
    let mut suffix = 0u32;
    while taken.contains(&candidate) {
        suffix += 1;
        let stem = file_name.file_stem().unwrap_or(file_name.as_os_str());
        candidate = stem.to_os_string();
        candidate.push(format!("_{suffix}"));
        if let Some(ext) = file_name.extension() {
            candidate.push(".");
            candidate.push(ext);
        }
    }
    taken.insert(candidate.clone());
    candidate
}

/// Restrict a project id to `[A-Za-z0-9_-]`
fn sanitize(project_id: &str) -> String {
    let cleaned: String = project_id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_PROJECT_ID.to_string()
    } else {
        cleaned
    }
}
