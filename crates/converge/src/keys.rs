//! `authorized_keys` layout

use std::path::{Path, PathBuf};

/// Comment block at the top of every generated `authorized_keys`
pub const AUTHORIZED_KEYS_HEADER: &str =
    "# Generated by accord.\n# Local modifications will be overwritten.\n\n";

/// `<home>/.ssh`
pub fn ssh_dir(home: &Path) -> PathBuf {
    home.join(".ssh")
}

/// `<home>/.ssh/authorized_keys`
pub fn authorized_keys_path(home: &Path) -> PathBuf {
    ssh_dir(home).join("authorized_keys")
}

/// Header followed by one key per line, in the given order
pub fn render_authorized_keys(keys: &[String]) -> String {
    let mut out = String::from(AUTHORIZED_KEYS_HEADER);
    for key in keys {
        out.push_str(key);
        out.push('\n');
    }
    out
}
