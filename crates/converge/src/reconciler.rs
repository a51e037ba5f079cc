//! The reconciliation run
//!
//! A run makes five sequential passes:
//!
//! 1. **Groups**: create groups new to the store (or, in deletion mode,
//!    remove the manifest's groups that the store knows).
//! 2. **Users**: create accounts new to the store, with home, `.ssh` and
//!    `authorized_keys`.
//! 3. **User drift**: walk every stored user; delete the ones gone from the
//!    manifest and patch group membership, SSH keys and shell of the rest.
//! 4. **Group drift**: prune stored groups gone from the manifest.
//! 5. **Grants**: rewrite the sudoers fragments.
//!
//! Every OS mutation happens before the store write that records it, and a
//! user's record is rewritten after each step of its drift update.

use ledger::{Entry, RecordStore};
use std::collections::{HashMap, HashSet};

use crate::context::{Host, NewAccount, ProgressCallback};
use crate::error::{Error, Result};
use crate::keys;
use crate::membership::MembershipIndex;
use crate::patch::{Delta, dedup, patch};
use crate::record::{self, GROUP_PREFIX, Namespace, USER_PREFIX};
use crate::types::{
    DesiredGroup, DesiredUser, EntityKind, ErrorPolicy, GroupRecord, Outcome, Pass, RunOptions,
    RunSummary, UserRecord,
};

/// Drives one run against a store and a host
pub struct Reconciler<'a> {
    store: &'a mut dyn RecordStore,
    host: Host<'a>,
    opts: &'a RunOptions,
}

/// Manifest entries for one run, duplicates removed
struct Desired<'m> {
    groups: Vec<&'m DesiredGroup>,
    users: Vec<&'m DesiredUser>,
    users_by_id: HashMap<&'m str, &'m DesiredUser>,
    index: MembershipIndex,
}

impl<'m> Desired<'m> {
    fn new(groups: &'m [DesiredGroup], users: &'m [DesiredUser]) -> Self {
        let groups = first_by_id(groups, |g| &g.id, EntityKind::Group);
        let users = first_by_id(users, |u| &u.id, EntityKind::User);

        let mut index = MembershipIndex::new();
        for group in &groups {
            index.record_group(group);
        }

        let users_by_id = users.iter().map(|&u| (u.id.as_str(), u)).collect();
        Self {
            groups,
            users,
            users_by_id,
            index,
        }
    }
}

/// Keep the first entry for each id
fn first_by_id<'m, T>(
    items: &'m [T],
    id: impl Fn(&T) -> &String,
    kind: EntityKind,
) -> Vec<&'m T> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(id(item).as_str()) {
            kept.push(item);
        } else {
            log::warn!("Duplicate {} {} in manifest, keeping the first", kind, id(item));
        }
    }
    kept
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a mut dyn RecordStore, host: Host<'a>, opts: &'a RunOptions) -> Self {
        Self { store, host, opts }
    }

    /// Run every pass and return what happened
    ///
    /// Under [`ErrorPolicy::Abort`] the first error ends the run. Under
    /// [`ErrorPolicy::Continue`] failing entities are recorded in the
    /// summary and skipped; store and configuration errors still abort.
    pub fn run<P: ProgressCallback>(
        &mut self,
        groups: &[DesiredGroup],
        users: &[DesiredUser],
        progress: &mut P,
    ) -> Result<RunSummary> {
        let desired = Desired::new(groups, users);
        let mut summary = RunSummary::default();

        log::info!(
            "Reconciling {} groups and {} users{}",
            desired.groups.len(),
            desired.users.len(),
            if self.opts.delete { " (deletion mode)" } else { "" }
        );

        progress.on_pass_start(Pass::Groups);
        for group in &desired.groups {
            let result = self.reconcile_group(group);
            self.settle(&mut summary, progress, EntityKind::Group, &group.id, result)?;
        }
        progress.on_pass_complete(Pass::Groups);

        progress.on_pass_start(Pass::Users);
        let mut created = HashSet::new();
        for user in &desired.users {
            let result = self.create_user(user, &desired.index).transpose();
            if let Some(result) = result {
                if matches!(result, Ok(Outcome::Created)) {
                    created.insert(user.id.clone());
                }
                self.settle(&mut summary, progress, EntityKind::User, &user.id, result)?;
            }
        }
        progress.on_pass_complete(Pass::Users);

        progress.on_pass_start(Pass::UserDrift);
        for entry in self.store.scan_prefix(USER_PREFIX)? {
            let id = entry.key_suffix(USER_PREFIX).unwrap_or(&entry.key).to_string();
            if created.contains(&id) {
                continue;
            }
            let result = self.reconcile_user(&entry, &desired);
            self.settle(&mut summary, progress, EntityKind::User, &id, result)?;
        }
        progress.on_pass_complete(Pass::UserDrift);

        progress.on_pass_start(Pass::GroupDrift);
        let keep: HashSet<&str> = if self.opts.delete {
            HashSet::new()
        } else {
            desired.groups.iter().map(|g| g.id.as_str()).collect()
        };
        for entry in self.store.scan_prefix(GROUP_PREFIX)? {
            let id = entry.key_suffix(GROUP_PREFIX).unwrap_or(&entry.key).to_string();
            if keep.contains(id.as_str()) {
                continue;
            }
            let result = self.prune_group(&entry);
            self.settle(&mut summary, progress, EntityKind::Group, &id, result)?;
        }
        progress.on_pass_complete(Pass::GroupDrift);

        if let Some(sudo) = &self.opts.sudo {
            progress.on_pass_start(Pass::Grants);
            let target = sudo.dir.display().to_string();
            let result = sudo.apply(self.opts.delete).map(|report| {
                let outcome = if report.removed == 0 && report.written == 0 {
                    Outcome::NoChange
                } else {
                    Outcome::Updated {
                        changes: vec![
                            format!("removed {} fragments", report.removed),
                            format!("wrote {} fragments", report.written),
                        ],
                    }
                };
                summary.grants = report;
                outcome
            });
            self.settle(&mut summary, progress, EntityKind::Grant, &target, result)?;
            progress.on_pass_complete(Pass::Grants);
        }

        log::info!(
            "Run finished: {} changes, {} failures",
            summary.total_changes(),
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Apply the error policy to one entity's result and report it
    fn settle<P: ProgressCallback>(
        &self,
        summary: &mut RunSummary,
        progress: &mut P,
        kind: EntityKind,
        id: &str,
        result: Result<Outcome>,
    ) -> Result<()> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() || self.opts.error_policy == ErrorPolicy::Abort => {
                return Err(e);
            }
            Err(e) => {
                log::warn!("Skipping {} {}: {}", kind, id, e);
                e.into()
            }
        };

        progress.on_entity_complete(kind, id, &outcome);
        summary.add(kind, id, &outcome);
        Ok(())
    }

    fn reconcile_group(&mut self, group: &DesiredGroup) -> Result<Outcome> {
        let key = record::group_key(&group.id)?;
        let exists = self.store.contains(&key)?;

        if self.opts.delete {
            if !exists {
                return Ok(Outcome::Skipped {
                    reason: "not managed".to_string(),
                });
            }
            self.host.accounts.delete_group(&group.id)?;
            self.store.delete(&key)?;
            log::debug!("Removed group {}", group.id);
            return Ok(Outcome::Removed);
        }

        if exists {
            return Ok(Outcome::NoChange);
        }

        self.host.accounts.create_group(&group.id)?;
        let record = GroupRecord {
            id: group.id.clone(),
        };
        self.store.put(&key, &record::encode_group(&record)?)?;
        log::debug!("Created group {}", group.id);
        Ok(Outcome::Created)
    }

    /// Create a user the store does not know yet
    ///
    /// `None` means the user is already managed and belongs to the drift
    /// pass.
    fn create_user(
        &mut self,
        user: &DesiredUser,
        index: &MembershipIndex,
    ) -> Result<Option<Outcome>> {
        let key = record::user_key(&user.id)?;
        if self.store.contains(&key)? {
            return Ok(None);
        }
        if self.opts.delete {
            return Ok(Some(Outcome::Skipped {
                reason: "never applied".to_string(),
            }));
        }

        let groups = dedup(index.groups_for(&user.id));
        let ssh_keys = dedup(&user.ssh_keys);
        let home = self.opts.home_of(&user.id);

        self.host.accounts.create_user(&NewAccount {
            name: user.id.clone(),
            shell: user.shell.clone(),
            home: home.clone(),
            groups: groups.clone(),
        })?;

        let owner = self.host.identity.owner(&user.id)?;
        self.host
            .files
            .create_private_dir(&keys::ssh_dir(&home), owner)?;
        if !ssh_keys.is_empty() {
            self.host.files.write_private_file(
                &keys::authorized_keys_path(&home),
                keys::render_authorized_keys(&ssh_keys).as_bytes(),
                owner,
            )?;
        }

        let record = UserRecord {
            id: user.id.clone(),
            groups,
            ssh_keys,
            shell: user.shell.clone(),
        };
        self.store.put(&key, &record::encode_user(&record)?)?;
        log::debug!("Created user {}", user.id);
        Ok(Some(Outcome::Created))
    }

    /// Delete or patch one stored user
    fn reconcile_user(&mut self, entry: &Entry, desired: &Desired<'_>) -> Result<Outcome> {
        let id = record::parse_key_in(Namespace::User, &entry.key)?;
        let stored = record::decode_user(&entry.key, &entry.value)?;

        let wanted = if self.opts.delete {
            None
        } else {
            desired.users_by_id.get(id).copied()
        };
        let Some(user) = wanted else {
            self.host.accounts.delete_user(id)?;
            self.store.delete(&entry.key)?;
            log::debug!("Removed user {}", id);
            return Ok(Outcome::Removed);
        };

        let groups = Delta::between(&stored.groups, &dedup(desired.index.groups_for(id)));
        let ssh_keys = Delta::between(&stored.ssh_keys, &user.ssh_keys);
        let shell_changed = stored.shell != user.shell;

        if groups.is_empty() && ssh_keys.is_empty() && !shell_changed {
            return Ok(Outcome::NoChange);
        }

        // Record each step as it succeeds
        let mut current = UserRecord {
            id: id.to_string(),
            ..stored.clone()
        };
        let mut changes = Vec::new();
        for group in &groups.to_remove {
            self.host.accounts.remove_from_group(id, group)?;
            current.groups = patch(&current.groups, &[], std::slice::from_ref(group));
            self.save_user(&entry.key, &current)?;
            changes.push(format!("left {group}"));
        }
        for group in &groups.to_add {
            self.host.accounts.add_to_group(id, group)?;
            current.groups = patch(&current.groups, std::slice::from_ref(group), &[]);
            self.save_user(&entry.key, &current)?;
            changes.push(format!("joined {group}"));
        }
        if shell_changed {
            self.host.accounts.set_shell(id, &user.shell)?;
            current.shell.clone_from(&user.shell);
            self.save_user(&entry.key, &current)?;
            changes.push(format!("shell {} -> {}", stored.shell, user.shell));
        }
        if !ssh_keys.is_empty() {
            let new_keys = ssh_keys.apply(&current.ssh_keys);
            self.write_keys(id, &new_keys)?;
            current.ssh_keys = new_keys;
            self.save_user(&entry.key, &current)?;
            changes.push(format!(
                "ssh keys +{} -{}",
                ssh_keys.to_add.len(),
                ssh_keys.to_remove.len()
            ));
        }

        log::debug!("Updated user {}: {}", id, changes.join(", "));
        Ok(Outcome::Updated { changes })
    }

    fn save_user(&mut self, key: &str, user: &UserRecord) -> Result<()> {
        self.store.put(key, &record::encode_user(user)?)?;
        Ok(())
    }

    /// Rewrite `authorized_keys`, or remove it when no key is left
    fn write_keys(&self, user: &str, ssh_keys: &[String]) -> Result<()> {
        let home = self.opts.home_of(user);
        let path = keys::authorized_keys_path(&home);

        if ssh_keys.is_empty() {
            self.host.files.remove_file(&path)?;
            return Ok(());
        }

        let owner = self.host.identity.owner(user)?;
        self.host
            .files
            .create_private_dir(&keys::ssh_dir(&home), owner)?;
        self.host.files.write_private_file(
            &path,
            keys::render_authorized_keys(ssh_keys).as_bytes(),
            owner,
        )
    }

    fn prune_group(&mut self, entry: &Entry) -> Result<Outcome> {
        let id = record::parse_key_in(Namespace::Group, &entry.key)?;
        self.host.accounts.delete_group(id)?;
        self.store.delete(&entry.key)?;
        log::debug!("Pruned group {}", id);
        Ok(Outcome::Removed)
    }
}

/// Run against `store` and `host` without progress reporting
pub fn reconcile(
    store: &mut dyn RecordStore,
    host: Host<'_>,
    opts: &RunOptions,
    groups: &[DesiredGroup],
    users: &[DesiredUser],
) -> Result<RunSummary> {
    Reconciler::new(store, host, opts).run(groups, users, &mut crate::context::NoProgress)
}

impl From<Error> for Outcome {
    fn from(error: Error) -> Self {
        Outcome::Failed {
            error: error.to_string(),
        }
    }
}
