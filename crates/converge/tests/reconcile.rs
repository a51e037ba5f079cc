//! Full runs against an in-memory store and a recording fake machine

use converge::{
    CommandOutput, CommandRunner, DesiredGroup, DesiredUser, EntityKind, Error, ErrorPolicy,
    HomeFiles, Host, IdentityResolver, LookupKind, Outcome, Owner, RunOptions, RunSummary,
    ShadowUtils, SudoGrants, UserRecord, record,
};
use ledger::{Entry, MemoryStore, RecordStore};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Records every mutation as a line and keeps written files in memory
#[derive(Default)]
struct Machine {
    log: RefCell<Vec<String>>,
    files: RefCell<BTreeMap<PathBuf, String>>,
    accounts: RefCell<HashMap<String, u32>>,
    next_uid: Cell<u32>,
    fail_on: Option<&'static str>,
}

impl Machine {
    fn failing_on(command: &'static str) -> Self {
        Self {
            fail_on: Some(command),
            ..Default::default()
        }
    }

    fn take_log(&self) -> Vec<String> {
        self.log.take()
    }

    fn file(&self, path: &str) -> Option<String> {
        self.files.borrow().get(Path::new(path)).cloned()
    }
}

impl CommandRunner for &Machine {
    fn run(&self, cmd: &str, args: &[&str]) -> converge::Result<CommandOutput> {
        let line = converge::error::command_line(cmd, args);
        self.log.borrow_mut().push(line.clone());

        if self.fail_on.is_some_and(|f| line.starts_with(f)) {
            return Ok(CommandOutput {
                stdout: Vec::new(),
                stderr: format!("{cmd}: simulated failure\n").into_bytes(),
                success: false,
                code: Some(1),
            });
        }

        let name = args.last().map(|a| (*a).to_string()).unwrap_or_default();
        match cmd {
            "useradd" => {
                let uid = 1000 + self.next_uid.get();
                self.next_uid.set(self.next_uid.get() + 1);
                self.accounts.borrow_mut().insert(name, uid);
            }
            "userdel" => {
                self.accounts.borrow_mut().remove(&name);
            }
            _ => {}
        }
        Ok(CommandOutput::ok())
    }
}

impl IdentityResolver for Machine {
    fn uid(&self, user: &str) -> converge::Result<u32> {
        self.accounts
            .borrow()
            .get(user)
            .copied()
            .ok_or_else(|| Error::Lookup {
                kind: LookupKind::User,
                name: user.to_string(),
            })
    }

    fn gid(&self, group: &str) -> converge::Result<u32> {
        // Only user-private groups are resolvable
        self.accounts
            .borrow()
            .get(group)
            .copied()
            .ok_or_else(|| Error::Lookup {
                kind: LookupKind::Group,
                name: group.to_string(),
            })
    }
}

impl HomeFiles for Machine {
    fn create_private_dir(&self, path: &Path, owner: Owner) -> converge::Result<()> {
        self.log.borrow_mut().push(format!(
            "mkdir {} {}:{}",
            path.display(),
            owner.uid,
            owner.gid
        ));
        Ok(())
    }

    fn write_private_file(&self, path: &Path, contents: &[u8], _owner: Owner) -> converge::Result<()> {
        self.log
            .borrow_mut()
            .push(format!("write {}", path.display()));
        self.files.borrow_mut().insert(
            path.to_path_buf(),
            String::from_utf8_lossy(contents).to_string(),
        );
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> converge::Result<bool> {
        self.log.borrow_mut().push(format!("rm {}", path.display()));
        Ok(self.files.borrow_mut().remove(path).is_some())
    }
}

fn run(
    machine: &Machine,
    store: &mut dyn RecordStore,
    opts: &RunOptions,
    groups: &[DesiredGroup],
    users: &[DesiredUser],
) -> converge::Result<RunSummary> {
    let accounts = ShadowUtils::new(machine);
    let host = Host {
        accounts: &accounts,
        identity: machine,
        files: machine,
    };
    converge::reconcile(store, host, opts, groups, users)
}

fn group(id: &str, users: &[&str]) -> DesiredGroup {
    DesiredGroup {
        id: id.to_string(),
        users: users.iter().map(|u| (*u).to_string()).collect(),
        admins: Vec::new(),
    }
}

fn user(id: &str, shell: &str, keys: &[&str]) -> DesiredUser {
    DesiredUser {
        id: id.to_string(),
        shell: shell.to_string(),
        ssh_keys: keys.iter().map(|k| (*k).to_string()).collect(),
    }
}

fn stored_user(store: &MemoryStore, id: &str) -> UserRecord {
    let key = record::user_key(id).unwrap();
    let bytes = store.get(&key).unwrap().unwrap();
    record::decode_user(&key, &bytes).unwrap()
}

fn stored_ids(store: &MemoryStore, prefix: &str) -> Vec<String> {
    store
        .scan_prefix(prefix)
        .unwrap()
        .iter()
        .map(|e: &Entry| e.key_suffix(prefix).unwrap().to_string())
        .collect()
}

fn base_groups() -> Vec<DesiredGroup> {
    vec![group("dev", &["alice"]), group("ops", &["alice", "bob"])]
}

fn base_users() -> Vec<DesiredUser> {
    vec![
        user("alice", "/bin/bash", &["k1", "k2"]),
        user("bob", "/bin/zsh", &[]),
    ]
}

#[test]
fn test_first_run_creates_everything() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    let summary = run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap();

    assert_eq!(
        machine.take_log(),
        vec![
            "groupadd dev",
            "groupadd ops",
            "useradd --shell /bin/bash --home /home/alice --groups dev,ops --create-home alice",
            "mkdir /home/alice/.ssh 1000:1000",
            "write /home/alice/.ssh/authorized_keys",
            "useradd --shell /bin/zsh --home /home/bob --groups ops --create-home bob",
            "mkdir /home/bob/.ssh 1001:1001",
        ]
    );
    assert_eq!(summary.groups.created, 2);
    assert_eq!(summary.users.created, 2);
    assert!(summary.is_success());

    assert_eq!(
        machine.file("/home/alice/.ssh/authorized_keys").unwrap(),
        "# Generated by accord.\n# Local modifications will be overwritten.\n\nk1\nk2\n"
    );
    assert_eq!(
        stored_user(&store, "alice"),
        UserRecord {
            id: "alice".into(),
            groups: vec!["dev".into(), "ops".into()],
            ssh_keys: vec!["k1".into(), "k2".into()],
            shell: "/bin/bash".into(),
        }
    );
}

#[test]
fn test_second_run_is_idempotent() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap();
    machine.take_log();
    let writes = store.writes();

    let summary = run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap();

    assert!(machine.take_log().is_empty());
    assert_eq!(store.writes(), writes);
    assert_eq!(summary.total_changes(), 0);
    assert_eq!(summary.groups.no_change, 2);
    assert_eq!(summary.users.no_change, 2);
}

#[test]
fn test_store_matches_manifest_after_run() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap();

    let groups = vec![group("ops", &["carol"]), group("web", &[])];
    let users = vec![user("carol", "/bin/bash", &[])];
    run(&machine, &mut store, &opts, &groups, &users).unwrap();

    assert_eq!(stored_ids(&store, "group@"), vec!["ops", "web"]);
    assert_eq!(stored_ids(&store, "user@"), vec!["carol"]);
}

#[test]
fn test_group_drift_patches_membership() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();
    let users = vec![user("alice", "/bin/bash", &[])];

    run(
        &machine,
        &mut store,
        &opts,
        &[group("dev", &["alice"]), group("ops", &["alice"])],
        &users,
    )
    .unwrap();
    machine.take_log();

    let summary = run(
        &machine,
        &mut store,
        &opts,
        &[group("ops", &["alice"]), group("qa", &["alice"])],
        &users,
    )
    .unwrap();

    assert_eq!(
        machine.take_log(),
        vec![
            "groupadd qa",
            "gpasswd -d alice dev",
            "usermod -a -G qa alice",
            "groupdel dev",
        ]
    );
    assert_eq!(stored_user(&store, "alice").groups, vec!["ops", "qa"]);
    assert_eq!(stored_ids(&store, "group@"), vec!["ops", "qa"]);
    assert_eq!(summary.users.updated, 1);
    assert_eq!(summary.groups.removed, 1);
}

#[test]
fn test_stale_group_is_pruned() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &[group("temp", &[])], &[]).unwrap();
    machine.take_log();

    let summary = run(&machine, &mut store, &opts, &[], &[]).unwrap();

    assert_eq!(machine.take_log(), vec!["groupdel temp"]);
    assert!(!store.contains("group@temp").unwrap());
    assert_eq!(summary.groups.removed, 1);
}

#[test]
fn test_ssh_key_drift_rewrites_file() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &[], &[user("alice", "/bin/bash", &["k1", "k2"])]).unwrap();
    machine.take_log();

    let summary = run(&machine, &mut store, &opts, &[], &[user("alice", "/bin/bash", &["k2", "k3"])]).unwrap();

    assert_eq!(
        machine.take_log(),
        vec![
            "mkdir /home/alice/.ssh 1000:1000",
            "write /home/alice/.ssh/authorized_keys",
        ]
    );
    let contents = machine.file("/home/alice/.ssh/authorized_keys").unwrap();
    assert!(contents.ends_with("\n\nk2\nk3\n"));
    assert_eq!(stored_user(&store, "alice").ssh_keys, vec!["k2", "k3"]);
    assert_eq!(summary.users.updated, 1);
}

#[test]
fn test_removing_last_key_removes_file() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &[], &[user("alice", "/bin/bash", &["k1"])]).unwrap();
    machine.take_log();

    run(&machine, &mut store, &opts, &[], &[user("alice", "/bin/bash", &[])]).unwrap();

    assert_eq!(machine.take_log(), vec!["rm /home/alice/.ssh/authorized_keys"]);
    assert!(machine.file("/home/alice/.ssh/authorized_keys").is_none());
    assert!(stored_user(&store, "alice").ssh_keys.is_empty());
}

#[test]
fn test_shell_drift() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &[], &[user("bob", "/bin/bash", &[])]).unwrap();
    machine.take_log();

    run(&machine, &mut store, &opts, &[], &[user("bob", "/bin/fish", &[])]).unwrap();

    assert_eq!(machine.take_log(), vec!["usermod --shell /bin/fish bob"]);
    assert_eq!(stored_user(&store, "bob").shell, "/bin/fish");
}

#[test]
fn test_padded_manifest_key_is_not_drift() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &[], &[user("alice", "/bin/bash", &["k1"])]).unwrap();
    machine.take_log();

    let padded: DesiredUser =
        serde_json::from_str(r#"{"id": "alice", "ssh_keys": ["k1  \n"]}"#).unwrap();
    let summary = run(&machine, &mut store, &opts, &[], &[padded]).unwrap();

    assert!(machine.take_log().is_empty());
    assert_eq!(summary.users.no_change, 1);
    assert_eq!(stored_user(&store, "alice").ssh_keys, vec!["k1"]);
}

#[test]
fn test_removed_user_is_deleted() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap();
    machine.take_log();

    let users = vec![user("alice", "/bin/bash", &["k1", "k2"])];
    let summary = run(&machine, &mut store, &opts, &base_groups(), &users).unwrap();

    assert_eq!(machine.take_log(), vec!["userdel --remove bob"]);
    assert_eq!(stored_ids(&store, "user@"), vec!["alice"]);
    assert_eq!(summary.users.removed, 1);
}

#[test]
fn test_deletion_mode_tears_down() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let sudo_dir = TempDir::new().unwrap();
    let mut opts = RunOptions {
        sudo: Some(SudoGrants {
            dir: sudo_dir.path().to_path_buf(),
            prefix: "accord-".into(),
            groups: vec!["ops".into()],
        }),
        ..Default::default()
    };

    let summary = run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap();
    assert_eq!(summary.grants.written, 1);
    assert!(sudo_dir.path().join("accord-ops").exists());
    machine.take_log();

    opts.delete = true;
    let mut users = base_users();
    users.push(user("carol", "/bin/bash", &[]));
    let summary = run(&machine, &mut store, &opts, &base_groups(), &users).unwrap();

    assert_eq!(
        machine.take_log(),
        vec![
            "groupdel dev",
            "groupdel ops",
            "userdel --remove alice",
            "userdel --remove bob",
        ]
    );
    assert_eq!(store.keys(), Vec::<String>::new());
    assert_eq!(summary.groups.removed, 2);
    assert_eq!(summary.users.removed, 2);
    assert_eq!(summary.users.skipped, 1);
    assert_eq!(summary.grants.removed, 1);
    assert_eq!(summary.grants.written, 0);
    assert!(!sudo_dir.path().join("accord-ops").exists());
}

#[test]
fn test_abort_stops_at_first_error() {
    let machine = Machine::failing_on("groupadd dev");
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    let err = run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap_err();

    assert!(matches!(err, Error::Command { .. }));
    assert_eq!(machine.take_log(), vec!["groupadd dev"]);
    assert!(store.keys().is_empty());
}

#[test]
fn test_continue_records_failure_and_keeps_going() {
    let machine = Machine::failing_on("groupadd dev");
    let mut store = MemoryStore::new();
    let opts = RunOptions {
        error_policy: ErrorPolicy::Continue,
        ..Default::default()
    };

    let summary = run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap();

    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, EntityKind::Group);
    assert_eq!(summary.failures[0].id, "dev");
    assert!(summary.failures[0].error.contains("groupadd dev"));
    assert_eq!(stored_ids(&store, "group@"), vec!["ops"]);
    assert_eq!(stored_ids(&store, "user@"), vec!["alice", "bob"]);
}

#[test]
fn test_failed_drift_keeps_completed_steps() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();
    let users = vec![user("alice", "/bin/bash", &[])];

    run(&machine, &mut store, &opts, &[group("dev", &["alice"])], &users).unwrap();

    let flaky = Machine::failing_on("usermod");
    let groups = vec![group("qa", &["alice"])];
    let err = run(&flaky, &mut store, &opts, &groups, &users).unwrap_err();

    assert!(matches!(err, Error::Command { .. }));
    assert_eq!(
        flaky.take_log(),
        vec!["groupadd qa", "gpasswd -d alice dev", "usermod -a -G qa alice"]
    );
    assert!(stored_user(&store, "alice").groups.is_empty());

    machine.take_log();
    run(&machine, &mut store, &opts, &groups, &users).unwrap();

    assert_eq!(
        machine.take_log(),
        vec!["usermod -a -G qa alice", "groupdel dev"]
    );
    assert_eq!(stored_user(&store, "alice").groups, vec!["qa"]);
}

#[test]
fn test_invalid_id_is_an_entity_failure() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions {
        error_policy: ErrorPolicy::Continue,
        ..Default::default()
    };

    let users = vec![user("../root", "/bin/bash", &[]), user("dave", "/bin/bash", &[])];
    let summary = run(&machine, &mut store, &opts, &[], &users).unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].id, "../root");
    assert_eq!(stored_ids(&store, "user@"), vec!["dave"]);
}

#[test]
fn test_unknown_account_is_a_lookup_failure() {
    /// Accepts every command but never registers accounts
    struct Forgetful(Machine);

    impl CommandRunner for &Forgetful {
        fn run(&self, cmd: &str, args: &[&str]) -> converge::Result<CommandOutput> {
            self.0
                .log
                .borrow_mut()
                .push(converge::error::command_line(cmd, args));
            Ok(CommandOutput::ok())
        }
    }

    let machine = Forgetful(Machine::default());
    let accounts = ShadowUtils::new(&machine);
    let host = Host {
        accounts: &accounts,
        identity: &machine.0,
        files: &machine.0,
    };
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    let err = converge::reconcile(
        &mut store,
        host,
        &opts,
        &[],
        &[user("erin", "/bin/bash", &[])],
    )
    .unwrap_err();

    match err {
        Error::Lookup { kind, name } => {
            assert_eq!(kind, LookupKind::User);
            assert_eq!(name, "erin");
        }
        other => panic!("Expected Lookup error, got: {:?}", other),
    }
    assert!(!store.contains("user@erin").unwrap());
}

#[test]
fn test_store_failure_aborts_under_continue() {
    /// Reads fine, refuses every write
    struct ReadOnly(MemoryStore);

    impl RecordStore for ReadOnly {
        fn get(&self, key: &str) -> ledger::Result<Option<Vec<u8>>> {
            self.0.get(key)
        }

        fn put(&mut self, _key: &str, _value: &[u8]) -> ledger::Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn delete(&mut self, key: &str) -> ledger::Result<bool> {
            self.0.delete(key)
        }

        fn scan_prefix(&self, prefix: &str) -> ledger::Result<Vec<Entry>> {
            self.0.scan_prefix(prefix)
        }
    }

    let machine = Machine::default();
    let mut store = ReadOnly(MemoryStore::new());
    let opts = RunOptions {
        error_policy: ErrorPolicy::Continue,
        ..Default::default()
    };

    let err = run(&machine, &mut store, &opts, &base_groups(), &base_users()).unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    assert_eq!(machine.take_log(), vec!["groupadd dev"]);
}

#[test]
fn test_duplicate_manifest_entries_keep_first() {
    let machine = Machine::default();
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();

    let groups = vec![group("dev", &["alice"]), group("dev", &["bob"])];
    let users = vec![
        user("alice", "/bin/zsh", &[]),
        user("alice", "/bin/bash", &[]),
    ];
    let summary = run(&machine, &mut store, &opts, &groups, &users).unwrap();

    assert_eq!(summary.groups.created, 1);
    assert_eq!(summary.users.created, 1);
    assert_eq!(stored_user(&store, "alice").shell, "/bin/zsh");
    assert_eq!(stored_user(&store, "alice").groups, vec!["dev"]);
}

#[test]
fn test_outcomes_reported_per_entity() {
    use converge::{Pass, ProgressCallback, Reconciler};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_pass_start(&mut self, pass: Pass) {
            self.events.push(format!("start {pass}"));
        }

        fn on_entity_complete(&mut self, kind: EntityKind, id: &str, outcome: &Outcome) {
            let label = match outcome {
                Outcome::Created => "created",
                Outcome::NoChange => "unchanged",
                Outcome::Updated { .. } => "updated",
                Outcome::Removed => "removed",
                Outcome::Skipped { .. } => "skipped",
                Outcome::Failed { .. } => "failed",
            };
            self.events.push(format!("{kind} {id} {label}"));
        }

        fn on_pass_complete(&mut self, _pass: Pass) {}
    }

    let machine = Machine::default();
    let accounts = ShadowUtils::new(&machine);
    let host = Host {
        accounts: &accounts,
        identity: &machine,
        files: &machine,
    };
    let mut store = MemoryStore::new();
    let opts = RunOptions::default();
    let mut recorder = Recorder::default();

    Reconciler::new(&mut store, host, &opts)
        .run(&[group("dev", &["alice"])], &[user("alice", "/bin/bash", &[])], &mut recorder)
        .unwrap();

    assert_eq!(
        recorder.events,
        vec![
            "start Groups",
            "group dev created",
            "start New users",
            "user alice created",
            "start User drift",
            "start Group drift",
        ]
    );
}
