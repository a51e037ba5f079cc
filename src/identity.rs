//! uid/gid lookup from `/etc/passwd` and `/etc/group`
//!
//! The files are read on every lookup: accounts created earlier in the
//! same run must resolve.

use converge::{Error, IdentityResolver, LookupKind};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves names through passwd/group style files
pub struct EtcFiles {
    passwd: PathBuf,
    group: PathBuf,
}

impl EtcFiles {
    pub fn new(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd: passwd.into(),
            group: group.into(),
        }
    }

    fn lookup(path: &Path, name: &str, kind: LookupKind) -> converge::Result<u32> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        find_id(&content, name).ok_or_else(|| Error::Lookup {
            kind,
            name: name.to_string(),
        })
    }
}

impl IdentityResolver for EtcFiles {
    fn uid(&self, user: &str) -> converge::Result<u32> {
        Self::lookup(&self.passwd, user, LookupKind::User)
    }

    fn gid(&self, group: &str) -> converge::Result<u32> {
        Self::lookup(&self.group, group, LookupKind::Group)
    }
}

/// Third field of the line whose first field is `name`
///
/// Both `name:x:uid:...` and `name:x:gid:...` keep the id there.
fn find_id(content: &str, name: &str) -> Option<u32> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let mut fields = line.split(':');
            if fields.next()? != name {
                return None;
            }
            fields.nth(1)?.parse().ok()
        })
}

/// Resolves through [`EtcFiles`], falling back to a placeholder for
/// accounts that only a dry run pretends to have created
pub struct DryRunIdentity(pub EtcFiles);

/// Owner reported for accounts that do not exist yet
const PLACEHOLDER_ID: u32 = 65534;

impl IdentityResolver for DryRunIdentity {
    fn uid(&self, user: &str) -> converge::Result<u32> {
        match self.0.uid(user) {
            Err(Error::Lookup { .. }) => Ok(PLACEHOLDER_ID),
            other => other,
        }
    }

    fn gid(&self, group: &str) -> converge::Result<u32> {
        match self.0.gid(group) {
            Err(Error::Lookup { .. }) => Ok(PLACEHOLDER_ID),
            other => other,
        }
    }
}
