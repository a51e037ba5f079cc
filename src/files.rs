//! Home-directory file operations

use converge::{Error, HomeFiles, Owner};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// Writes to the real filesystem and hands ownership to the account
pub struct LocalFiles;

impl LocalFiles {
    fn chown(path: &Path, owner: Owner) -> converge::Result<()> {
        std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid))
            .map_err(|e| Error::io(path, e))
    }

    fn chmod(path: &Path, mode: u32) -> converge::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::io(path, e))
    }
}

impl HomeFiles for LocalFiles {
    fn create_private_dir(&self, path: &Path, owner: Owner) -> converge::Result<()> {
        match fs::DirBuilder::new().mode(DIR_MODE).create(path) {
            Ok(()) => log::debug!("Created {}", path.display()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => {}
            Err(e) => return Err(Error::io(path, e)),
        }
        Self::chmod(path, DIR_MODE)?;
        Self::chown(path, owner)
    }

    fn write_private_file(&self, path: &Path, contents: &[u8], owner: Owner) -> converge::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        file.write_all(contents).map_err(|e| Error::io(path, e))?;

        Self::chmod(path, FILE_MODE)?;
        Self::chown(path, owner)?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> converge::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Removed {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

/// Prints file operations instead of performing them
pub struct PrintFiles;

impl HomeFiles for PrintFiles {
    fn create_private_dir(&self, path: &Path, owner: Owner) -> converge::Result<()> {
        crate::ui::dim(&format!(
            "would create {} (0700, {}:{})",
            path.display(),
            owner.uid,
            owner.gid
        ));
        Ok(())
    }

    fn write_private_file(&self, path: &Path, contents: &[u8], owner: Owner) -> converge::Result<()> {
        crate::ui::dim(&format!(
            "would write {} ({} bytes, 0600, {}:{})",
            path.display(),
            contents.len(),
            owner.uid,
            owner.gid
        ));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> converge::Result<bool> {
        crate::ui::dim(&format!("would remove {}", path.display()));
        Ok(path.exists())
    }
}
