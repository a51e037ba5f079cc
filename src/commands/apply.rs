//! `accord apply`

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use converge::{
    DesiredGroup, DesiredUser, ErrorPolicy, Host, Reconciler, RunOptions, RunSummary,
    ShadowUtils,
};
use ledger::{MemoryStore, SqliteStore};
use std::path::PathBuf;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::{self, Config};
use crate::fetch;
use crate::files::{LocalFiles, PrintFiles};
use crate::identity::{DryRunIdentity, EtcFiles};
use crate::lock::RunLock;
use crate::progress::Reporter;
use crate::runner::{PrintRunner, SystemRunner};
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut config = Config::load(ctx.config.as_deref())?;
    super::apply_source(&mut config, &args.source);
    if let Some(store) = &args.store {
        config.store_path = config::expand(store);
    }
    config.validate()?;

    if !args.dry_run && !is_root() {
        bail!("apply changes system accounts and must run as root (use --dry-run to preview)");
    }

    if args.delete && !args.yes && !args.dry_run {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Delete every managed user, group and sudo grant?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirmed {
            ui::info("Nothing deleted");
            return Ok(());
        }
    }

    if args.keep_going {
        ui::warn(
            "--keep-going: failing users and groups are skipped, so the machine may end up partly reconciled",
        );
    }

    let root: PathBuf = match &args.manifest {
        Some(dir) => dir.clone(),
        None => fetch::fetch(&config)?,
    };
    let groups_dir = config.groups_path(&root);
    let users_dir = config.users_path(&root);
    let groups = converge::manifest::load_groups(&groups_dir)
        .with_context(|| format!("Failed to load groups from {}", groups_dir.display()))?;
    let users = converge::manifest::load_users(&users_dir)
        .with_context(|| format!("Failed to load users from {}", users_dir.display()))?;
    log::info!("Loaded {} groups and {} users", groups.len(), users.len());

    let policy = if args.keep_going {
        ErrorPolicy::Continue
    } else {
        ErrorPolicy::Abort
    };
    let opts = config.run_options(args.delete, policy);
    let mut reporter = Reporter::new(ctx.verbose > 0, ctx.quiet);

    if args.dry_run {
        ui::header("Dry run");
    } else if args.delete {
        ui::header("Deleting managed accounts");
    } else {
        ui::header("Reconciling accounts");
    }

    let summary = if args.dry_run {
        dry_run(&config, opts, &groups, &users, &mut reporter)?
    } else {
        let _lock = RunLock::acquire(&config.store_path)?;
        let mut store = SqliteStore::open(&config.store_path).with_context(|| {
            format!("Failed to open store at {}", config.store_path.display())
        })?;

        let accounts = ShadowUtils::new(SystemRunner);
        let identity = EtcFiles::new(&config.passwd_file, &config.group_file);
        let host = Host {
            accounts: &accounts,
            identity: &identity,
            files: &LocalFiles,
        };
        Reconciler::new(&mut store, host, &opts).run(&groups, &users, &mut reporter)?
    };

    print_summary(&summary, args.dry_run);

    if args.clean {
        fetch::clean(&config.work_dir)?;
    }

    if !summary.is_success() {
        bail!(
            "Run finished with {}; rerun after fixing the errors above",
            ui::plural(summary.failures.len(), "failure")
        );
    }
    Ok(())
}

/// Run against a copy of the store with a host that only prints
fn dry_run(
    config: &Config,
    mut opts: RunOptions,
    groups: &[DesiredGroup],
    users: &[DesiredUser],
    reporter: &mut Reporter,
) -> Result<RunSummary> {
    let mut store = if config.store_path.exists() {
        let real = SqliteStore::open(&config.store_path).with_context(|| {
            format!("Failed to open store at {}", config.store_path.display())
        })?;
        MemoryStore::snapshot_of(&real)?
    } else {
        log::debug!(
            "No store at {}, starting from empty",
            config.store_path.display()
        );
        MemoryStore::new()
    };

    // Grants write straight to disk, so describe them instead
    if let Some(sudo) = opts.sudo.take() {
        ui::dim(&format!(
            "would remove {}* from {}",
            sudo.prefix,
            sudo.dir.display()
        ));
        if !opts.delete {
            for group in &sudo.groups {
                ui::dim(&format!(
                    "would write {}",
                    sudo.dir.join(sudo.fragment_name(group)).display()
                ));
            }
        }
    }

    let accounts = ShadowUtils::new(PrintRunner);
    let identity = DryRunIdentity(EtcFiles::new(&config.passwd_file, &config.group_file));
    let host = Host {
        accounts: &accounts,
        identity: &identity,
        files: &PrintFiles,
    };
    let summary = Reconciler::new(&mut store, host, &opts).run(groups, users, reporter)?;

    log::debug!("Dry run would write {} records", store.writes());
    Ok(summary)
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    let verb = if dry_run { "Would make" } else { "Made" };
    let changes = summary.total_changes();

    if changes == 0 && summary.is_success() {
        ui::success("Everything up to date");
    } else {
        ui::info(&format!("{} {}", verb, ui::plural(changes, "change")));
    }

    for (name, tally) in [("Groups", &summary.groups), ("Users", &summary.users)] {
        ui::kv(
            name,
            &format!(
                "{} created, {} updated, {} removed, {} unchanged{}",
                tally.created,
                tally.updated,
                tally.removed,
                tally.no_change,
                if tally.failed > 0 {
                    format!(", {}", format!("{} failed", tally.failed).red())
                } else {
                    String::new()
                }
            ),
        );
    }

    if !dry_run {
        ui::kv(
            "Sudo grants",
            &format!(
                "{} removed, {} written",
                summary.grants.removed, summary.grants.written
            ),
        );
    }

    for failure in &summary.failures {
        ui::error(&format!("{} {}: {}", failure.kind, failure.id, failure.error));
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}
