//! Sudoers fragments for sudo-enabled groups
//!
//! Unlike accounts, grants are not diffed: every run removes all fragments
//! carrying the marker prefix and writes the configured set again.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Mode of written fragments, as `visudo` expects
const FRAGMENT_MODE: u32 = 0o440;

/// Configuration for managed sudoers fragments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SudoGrants {
    /// Directory included by the main sudoers file
    pub dir: PathBuf,
    /// File name prefix marking fragments as ours
    pub prefix: String,
    /// Groups granted unrestricted sudo
    pub groups: Vec<String>,
}

impl Default for SudoGrants {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/etc/sudoers.d"),
            prefix: "accord-".to_string(),
            groups: Vec::new(),
        }
    }
}

/// What a grants pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantReport {
    /// Fragments deleted from earlier runs
    pub removed: usize,
    /// Fragments written by this run
    pub written: usize,
}

impl SudoGrants {
    /// Check if a group is granted sudo
    pub fn grants(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// File name of the fragment for `group`
    ///
    /// sudo skips included files whose name contains `.` or ends in `~`,
    /// so those characters become `_`.
    pub fn fragment_name(&self, group: &str) -> String {
        let mut name: String = group
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect();
        if name.ends_with('~') {
            name.pop();
            name.push('_');
        }
        format!("{}{}", self.prefix, name)
    }

    /// Contents of the fragment for `group`
    pub fn fragment_contents(group: &str) -> String {
        format!("%{group} ALL=(ALL) ALL\n")
    }

    /// Remove old fragments, then write one per group unless `delete`
    pub fn apply(&self, delete: bool) -> Result<GrantReport> {
        if self.prefix.is_empty() {
            return Err(Error::Config(
                "sudoers fragment prefix must not be empty".to_string(),
            ));
        }

        let removed = self.remove_fragments()?;
        if delete {
            return Ok(GrantReport {
                removed,
                written: 0,
            });
        }

        let mut written = 0;
        for group in &self.groups {
            crate::record::validate_id(group)?;
            let path = self.dir.join(self.fragment_name(group));
            write_fragment(&path, &Self::fragment_contents(group))?;
            log::debug!("Wrote sudoers fragment {}", path.display());
            written += 1;
        }

        Ok(GrantReport { removed, written })
    }

    /// Delete every file in the directory whose name has our prefix
    fn remove_fragments(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io(&self.dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let name = entry.file_name();
            let is_ours = name
                .to_str()
                .is_some_and(|n| n.starts_with(self.prefix.as_str()));
            if !is_ours {
                continue;
            }

            let path = entry.path();
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            log::debug!("Removed sudoers fragment {}", path.display());
            removed += 1;
        }
        Ok(removed)
    }
}

fn write_fragment(path: &Path, contents: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FRAGMENT_MODE)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| Error::io(path, e))?;
    fs::set_permissions(path, fs::Permissions::from_mode(FRAGMENT_MODE))
        .map_err(|e| Error::io(path, e))
}
