//! Desired-state loader
//!
//! A manifest is two directories of JSON files, one file per group and one
//! per user. Files are read in file-name order; anything not ending in
//! `.json` is ignored.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{DesiredGroup, DesiredUser};

/// Load every group file in `dir`
pub fn load_groups(dir: &Path) -> Result<Vec<DesiredGroup>> {
    load_dir(dir)
}

/// Load every user file in `dir`
pub fn load_users(dir: &Path) -> Result<Vec<DesiredUser>> {
    load_dir(dir)
}

/// `.json` files directly inside `dir`, sorted by file name
pub fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn load_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let files = manifest_files(dir)?;
    log::debug!("Loading {} manifest files from {}", files.len(), dir.display());

    files.iter().map(|path| load_file(path)).collect()
}

fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| Error::Decode {
        context: path.display().to_string(),
        source,
    })
}
