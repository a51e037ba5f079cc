//! Core types for account reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Output;

use crate::grants::{GrantReport, SudoGrants};

// ============================================================================
// Desired state
// ============================================================================

/// A group as declared by the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredGroup {
    pub id: String,
    /// Members, in manifest order
    #[serde(default)]
    pub users: Vec<String>,
    /// Carried for completeness; reconciliation does not act on it
    #[serde(default)]
    pub admins: Vec<String>,
}

/// A user as declared by the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredUser {
    pub id: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Public keys, in manifest order, surrounding whitespace removed
    #[serde(default, deserialize_with = "trimmed_keys")]
    pub ssh_keys: Vec<String>,
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

/// Trim each key and drop the ones left empty
fn trimmed_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let keys = Vec::<String>::deserialize(deserializer)?;
    Ok(keys
        .into_iter()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect())
}

// ============================================================================
// Persisted state
// ============================================================================

/// Last-applied state of a user account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    /// Duplicate-free supplementary groups
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    #[serde(default)]
    pub shell: String,
}

/// Last-applied state of a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Kind of entity a pass operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Group,
    User,
    Grant,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Group => write!(f, "group"),
            EntityKind::User => write!(f, "user"),
            EntityKind::Grant => write!(f, "sudo grant"),
        }
    }
}

/// The passes of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Groups,
    Users,
    UserDrift,
    GroupDrift,
    Grants,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Groups => write!(f, "Groups"),
            Pass::Users => write!(f, "New users"),
            Pass::UserDrift => write!(f, "User drift"),
            Pass::GroupDrift => write!(f, "Group drift"),
            Pass::Grants => write!(f, "Sudo grants"),
        }
    }
}

/// Result of reconciling one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Persisted state already matched
    NoChange,
    /// Entity was created
    Created,
    /// Entity drifted and was corrected
    Updated { changes: Vec<String> },
    /// Entity was removed
    Removed,
    /// Reconciliation failed and the run continued
    Failed { error: String },
    /// Nothing to do for this entity in this mode
    Skipped { reason: String },
}

impl Outcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated { .. } | Self::Removed)
    }
}

/// Per-kind outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl Tally {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.removed
    }

    /// Total number of entities processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add an outcome to the tally
    pub fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::NoChange => self.no_change += 1,
            Outcome::Created => self.created += 1,
            Outcome::Updated { .. } => self.updated += 1,
            Outcome::Removed => self.removed += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// An entity that failed under [`ErrorPolicy::Continue`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: EntityKind,
    pub id: String,
    pub error: String,
}

/// Summary of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub groups: Tally,
    pub users: Tally,
    pub grants: GrantReport,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Account and group changes made (grant rewrites are not counted)
    pub fn total_changes(&self) -> usize {
        self.groups.total_changes() + self.users.total_changes()
    }

    /// Record an outcome for an entity
    pub fn add(&mut self, kind: EntityKind, id: &str, outcome: &Outcome) {
        match kind {
            EntityKind::Group => self.groups.add(outcome),
            EntityKind::User => self.users.add(outcome),
            EntityKind::Grant => {}
        }
        if let Outcome::Failed { error } = outcome {
            self.failures.push(Failure {
                kind,
                id: id.to_string(),
                error: error.clone(),
            });
        }
    }
}

// ============================================================================
// Options
// ============================================================================

/// What to do when a single entity fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the run at the first error
    #[default]
    Abort,
    /// Record the failure, skip the entity and carry on
    Continue,
}

/// Settings for one run, built once at startup
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Tear down every stored entity instead of converging
    pub delete: bool,
    /// Parent of every managed home directory
    pub home_root: PathBuf,
    pub error_policy: ErrorPolicy,
    /// Sudoers fragments to manage; `None` skips the grants pass
    pub sudo: Option<SudoGrants>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            delete: false,
            home_root: PathBuf::from("/home"),
            error_policy: ErrorPolicy::Abort,
            sudo: None,
        }
    }
}

impl RunOptions {
    /// Home directory of a managed account
    pub fn home_of(&self, user: &str) -> PathBuf {
        self.home_root.join(user)
    }
}

// ============================================================================
// Collaborator data
// ============================================================================

/// Numeric owner for files placed in a home directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Output from an account command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// A successful run with no output
    pub fn ok() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
