//! `accord status`

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use converge::UserRecord;
use converge::record::{self, GROUP_PREFIX, USER_PREFIX};
use ledger::{RecordStore, SqliteStore};

use crate::Context;
use crate::cli::StatusArgs;
use crate::config::{self, Config};
use crate::ui;

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let mut config = Config::load(ctx.config.as_deref())?;
    if let Some(store) = &args.store {
        config.store_path = config::expand(store);
    }

    ui::header("Accord Status");
    ui::kv("Store", &config.store_path.display().to_string());

    if !config.store_path.exists() {
        println!();
        ui::info("No store yet; nothing has been applied on this machine");
        return Ok(());
    }

    let store = SqliteStore::open(&config.store_path)
        .with_context(|| format!("Failed to open store at {}", config.store_path.display()))?;
    show(&store)
}

fn show(store: &dyn RecordStore) -> Result<()> {
    let stats = store.stats()?;
    ui::kv("Records", &stats.records.to_string());
    ui::kv(
        "Last write",
        &stats
            .last_write
            .map_or_else(|| "never".to_string(), ui::format_timestamp),
    );

    let groups = store.scan_prefix(GROUP_PREFIX)?;
    ui::section(&format!("Groups ({})", groups.len()));
    for entry in &groups {
        match record::decode_group(&entry.key, &entry.value) {
            Ok(group) => println!("  {}", group.id),
            Err(e) => ui::warn(&format!("{}: {}", entry.key, e)),
        }
    }

    let users = store.scan_prefix(USER_PREFIX)?;
    ui::section(&format!("Users ({})", users.len()));
    for entry in &users {
        match record::decode_user(&entry.key, &entry.value) {
            Ok(user) => {
                println!("  {}", user.id.bold());
                println!("    {}", describe_user(&user).dimmed());
                println!(
                    "    {}",
                    format!("updated {}", ui::format_timestamp(entry.updated_at)).dimmed()
                );
            }
            Err(e) => ui::warn(&format!("{}: {}", entry.key, e)),
        }
    }

    println!();
    Ok(())
}

fn describe_user(user: &UserRecord) -> String {
    let groups = if user.groups.is_empty() {
        "no groups".to_string()
    } else {
        user.groups.join(", ")
    };
    format!(
        "{} | {} | {}",
        groups,
        ui::plural(user.ssh_keys.len(), "key"),
        user.shell
    )
}
