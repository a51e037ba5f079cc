//! # Converge
//!
//! Reconciliation engine for Unix groups, accounts, SSH keys and sudo
//! grants.
//!
//! A run compares the desired state (one JSON document per group and per
//! user) with the last-applied state kept in a [`ledger::RecordStore`], and
//! issues only the OS changes needed to close the gap. Running it twice
//! with the same manifest changes nothing the second time.
//!
//! ## Architecture
//!
//! - **Manifest**: [`manifest::load_groups`] and [`manifest::load_users`]
//!   decode the desired state
//! - **Membership**: [`MembershipIndex`] inverts group member lists into
//!   per-user group lists
//! - **Patch**: [`Delta`] and [`patch`] compute and apply set differences
//!   over ordered lists
//! - **Reconciler**: [`Reconciler`] runs the group, user, drift and grant
//!   passes
//! - **Collaborators**: the OS is reached only through [`AccountCommands`],
//!   [`IdentityResolver`] and [`HomeFiles`], bundled in a [`Host`]
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Host, NoProgress, Reconciler, RunOptions};
//! use ledger::SqliteStore;
//!
//! let mut store = SqliteStore::open(path)?;
//! let groups = converge::manifest::load_groups(&groups_dir)?;
//! let users = converge::manifest::load_users(&users_dir)?;
//!
//! let host = Host { accounts: &accounts, identity: &identity, files: &files };
//! let opts = RunOptions::default();
//! let summary = Reconciler::new(&mut store, host, &opts).run(&groups, &users, &mut NoProgress)?;
//! println!("{} changes", summary.total_changes());
//! ```

pub mod accounts;
pub mod context;
pub mod error;
pub mod grants;
pub mod keys;
pub mod manifest;
pub mod membership;
pub mod patch;
pub mod reconciler;
pub mod record;
pub mod types;

pub use accounts::ShadowUtils;
pub use context::{
    AccountCommands, CommandRunner, HomeFiles, Host, IdentityResolver, NewAccount, NoProgress,
    ProgressCallback,
};
pub use error::{Error, LookupKind, Result};
pub use grants::{GrantReport, SudoGrants};
pub use membership::MembershipIndex;
pub use patch::{Delta, patch};
pub use reconciler::{Reconciler, reconcile};
pub use types::{
    CommandOutput, DesiredGroup, DesiredUser, EntityKind, ErrorPolicy, Failure, GroupRecord,
    Outcome, Owner, Pass, RunOptions, RunSummary, Tally, UserRecord,
};
