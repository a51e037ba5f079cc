//! Error types for the converge crate

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::CommandOutput;

/// What an identity lookup was searching for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    User,
    Group,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::User => write!(f, "user"),
            LookupKind::Group => write!(f, "group"),
        }
    }
}

/// Errors that can occur while reconciling
#[derive(Error, Debug)]
pub enum Error {
    /// uid/gid resolution for an unknown name
    #[error("unknown {kind}: {name}")]
    Lookup { kind: LookupKind, name: String },

    /// An account command exited non-zero
    #[error("command `{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    /// An account command could not be started at all
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Record store failure
    #[error("store error: {0}")]
    Store(#[from] ledger::Error),

    /// Manifest entry or stored record could not be decoded
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored record carries a schema other than the one its key implies
    #[error("record {key} has schema {found}, expected {expected}")]
    SchemaMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Store key that does not follow the `<kind>@<id>` scheme
    #[error("invalid record key: {0}")]
    InvalidKey(String),

    /// Group or user id that cannot be used as an account name
    #[error("invalid id {0:?}")]
    InvalidId(String),

    /// Filesystem failure on a specific path
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unusable settings
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Build a command failure from a finished process
    pub fn command(cmd: &str, args: &[&str], output: &CommandOutput) -> Self {
        let status = match output.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        Self::Command {
            command: command_line(cmd, args),
            status,
            stderr: output.stderr_str().trim().to_string(),
        }
    }

    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the run regardless of error policy
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Config(_))
    }
}

/// Render a command and its arguments as a single line
pub fn command_line(cmd: &str, args: &[&str]) -> String {
    if args.is_empty() {
        cmd.to_string()
    } else {
        format!("{} {}", cmd, args.join(" "))
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
