//! Collaborator traits
//!
//! The reconciler never touches the OS directly. Account commands, identity
//! lookups and home-directory files all go through these traits, so the
//! engine can run against the real system, a dry-run printer, or a test
//! double.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{CommandOutput, EntityKind, Outcome, Owner, Pass};

/// Runs external programs
pub trait CommandRunner {
    /// Run a command to completion
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command and fail on a non-zero exit
    fn run_checked(&self, cmd: &str, args: &[&str]) -> Result<()> {
        let output = self.run(cmd, args)?;
        if !output.success {
            return Err(Error::command(cmd, args, &output));
        }
        Ok(())
    }
}

/// A new account to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub shell: String,
    pub home: PathBuf,
    /// Supplementary groups; omitted from the command when empty
    pub groups: Vec<String>,
}

/// OS account and group management
pub trait AccountCommands {
    fn create_group(&self, group: &str) -> Result<()>;

    fn delete_group(&self, group: &str) -> Result<()>;

    /// Create the account and its home directory
    fn create_user(&self, account: &NewAccount) -> Result<()>;

    /// Delete the account and its home directory
    fn delete_user(&self, user: &str) -> Result<()>;

    fn add_to_group(&self, user: &str, group: &str) -> Result<()>;

    fn remove_from_group(&self, user: &str, group: &str) -> Result<()>;

    fn set_shell(&self, user: &str, shell: &str) -> Result<()>;
}

/// Name to numeric id resolution
pub trait IdentityResolver {
    /// uid of a user; [`Error::Lookup`] if unknown
    fn uid(&self, user: &str) -> Result<u32>;

    /// gid of a group; [`Error::Lookup`] if unknown
    fn gid(&self, group: &str) -> Result<u32>;

    /// Owner for files of `user`: its uid and the gid of the group named
    /// after it
    fn owner(&self, user: &str) -> Result<Owner> {
        Ok(Owner {
            uid: self.uid(user)?,
            gid: self.gid(user)?,
        })
    }
}

/// Filesystem primitives for files inside home directories
pub trait HomeFiles {
    /// Create `path` (if missing) with mode `0700` and chown it
    fn create_private_dir(&self, path: &Path, owner: Owner) -> Result<()>;

    /// Replace `path` with `contents`, mode `0600`, and chown it
    fn write_private_file(&self, path: &Path, contents: &[u8], owner: Owner) -> Result<()>;

    /// Remove `path`, returning whether it existed
    fn remove_file(&self, path: &Path) -> Result<bool>;
}

/// The set of collaborators a run mutates the machine through
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub accounts: &'a dyn AccountCommands,
    pub identity: &'a dyn IdentityResolver,
    pub files: &'a dyn HomeFiles,
}

/// Progress callback for reconciliation runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called when a pass starts
    fn on_pass_start(&mut self, pass: Pass);

    /// Called when an entity has been reconciled (or failed)
    fn on_entity_complete(&mut self, kind: EntityKind, id: &str, outcome: &Outcome);

    /// Called when a pass completes
    fn on_pass_complete(&mut self, pass: Pass);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_pass_start(&mut self, _pass: Pass) {}
    fn on_entity_complete(&mut self, _kind: EntityKind, _id: &str, _outcome: &Outcome) {}
    fn on_pass_complete(&mut self, _pass: Pass) {}
}
