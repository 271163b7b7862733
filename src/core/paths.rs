// src/core/paths.rs

use crate::constants::{HOME_ENV, INIT_DIR, TEMPLATES_DIR};
use lazy_static::lazy_static;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref VX_HOME: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Invalid path")]
    InvalidPath,
    #[error("Could not expand '{path}': {reason}")]
    Expansion { path: String, reason: String },
    #[error("Could not determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Returns the tool home: the directory holding `templates/` and `init/`.
///
/// Resolution order is `$VX_HOME`, then the directory of the executable (or its
/// parent) when it holds `templates/`, then the directory this crate was built from.
/// The result is memoized.
pub fn get_vx_home() -> PathBuf {
    let mut cached = match VX_HOME.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(path) = &*cached {
        return path.clone();
    }

    let home = env::var_os(HOME_ENV)
        .map(PathBuf::from)
        .or_else(home_next_to_executable)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")));
    log::debug!("Tool home resolved to '{}'", home.display());

    *cached = Some(home.clone());
    home
}

fn home_next_to_executable() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    let dir = exe.parent()?;
    [Some(dir), dir.parent()]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.join(TEMPLATES_DIR).is_dir())
        .map(Path::to_path_buf)
}

pub fn templates_dir(home: &Path) -> PathBuf {
    home.join(TEMPLATES_DIR)
}

pub fn init_dir(home: &Path) -> PathBuf {
    home.join(INIT_DIR)
}

/// Resolves the working root: `path` (after `~`/env expansion) or the current directory.
///
/// The path must exist. The result is canonical (without `\\?\` on Windows).
pub fn set_root(path: Option<&str>) -> Result<PathBuf, PathError> {
    let candidate = match path {
        Some(raw) => {
            let expanded = shellexpand::full(raw).map_err(|e| PathError::Expansion {
                path: raw.to_string(),
                reason: e.to_string(),
            })?;
            PathBuf::from(expanded.into_owned())
        }
        None => env::current_dir().map_err(PathError::CurrentDir)?,
    };

    if !candidate.exists() {
        return Err(PathError::InvalidPath);
    }
    dunce::canonicalize(&candidate).map_err(|_| PathError::InvalidPath)
}
