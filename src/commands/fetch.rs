//! `accord fetch`

use anyhow::Result;

use crate::Context;
use crate::cli::SourceArgs;
use crate::config::Config;
use crate::{fetch, ui};

pub fn run(ctx: &Context, args: SourceArgs) -> Result<()> {
    let mut config = Config::load(ctx.config.as_deref())?;
    super::apply_source(&mut config, &args);

    let root = fetch::fetch(&config)?;
    let groups = converge::manifest::manifest_files(&config.groups_path(&root))?;
    let users = converge::manifest::manifest_files(&config.users_path(&root))?;

    ui::success(&format!("Manifest unpacked into {}", root.display()));
    ui::kv("Groups", &groups.len().to_string());
    ui::kv("Users", &users.len().to_string());
    Ok(())
}
