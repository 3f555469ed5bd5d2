//! Tool executable discovery
//!
//! An explicitly configured install directory is searched first, then `PATH`.

use std::path::{Path, PathBuf};

/// Locate an executable by name or path
///
/// Names containing a path separator are checked as given. An invalid
/// `install_dir` is logged and ignored.
pub fn locate_executable(name: &str, install_dir: Option<&Path>) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    if let Some(dir) = install_dir {
        if dir.is_dir() {
            if let Ok(found) = which::which_in(name, Some(dir), dir) {
                tracing::debug!("Found {name} in {}", dir.display());
                return Some(found);
            }
        } else {
            tracing::error!(
                "Install directory {} for '{name}' does not exist; searching PATH",
                dir.display()
            );
        }
    }

    match which::which(name) {
        Ok(found) => {
            tracing::debug!("Found {name} at {}", found.display());
            Some(found)
        }
        Err(_) => {
            tracing::debug!("'{name}' not found on PATH");
            None
        }
    }
}

/// Whether an executable can be located
pub fn is_installed(name: &str, install_dir: Option<&Path>) -> bool {
    locate_executable(name, install_dir).is_some()
}
