//! Configuration file
//!
//! `/etc/accord/config.toml` by default. Every key is optional; a missing
//! file means all defaults. Command-line flags override what is loaded here.

use anyhow::{Context, Result, bail};
use converge::{ErrorPolicy, RunOptions, SudoGrants};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the configuration is read from when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/accord/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the manifest bundles are unpacked into
    pub work_dir: PathBuf,

    /// SQLite database holding the last-applied state
    pub store_path: PathBuf,

    /// Parent of managed home directories
    pub home_root: PathBuf,

    /// Main manifest bundle
    pub master_url: Option<String>,

    /// User bundle, unpacked into `data_bags`
    pub user_url: Option<String>,

    /// Group files, relative to the manifest root
    pub groups_dir: PathBuf,

    /// User files, relative to the manifest root
    pub users_dir: PathBuf,

    pub passwd_file: PathBuf,

    pub group_file: PathBuf,

    pub sudo: SudoConfig,
}

/// `[sudo]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SudoConfig {
    /// Directory included by the main sudoers file
    pub dir: PathBuf,

    /// File name prefix of managed fragments
    pub prefix: String,

    /// Groups granted sudo
    pub groups: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/accord-work"),
            store_path: PathBuf::from("/var/lib/accord/state.db"),
            home_root: PathBuf::from("/home"),
            master_url: None,
            user_url: None,
            groups_dir: PathBuf::from("data_bags/groups"),
            users_dir: PathBuf::from("data_bags/users"),
            passwd_file: PathBuf::from("/etc/passwd"),
            group_file: PathBuf::from("/etc/group"),
            sudo: SudoConfig::default(),
        }
    }
}

impl Default for SudoConfig {
    fn default() -> Self {
        let grants = SudoGrants::default();
        Self {
            dir: grants.dir,
            prefix: grants.prefix,
            groups: grants.groups,
        }
    }
}

impl Config {
    /// Load the config file
    ///
    /// Without an explicit path, a missing default file yields the
    /// defaults. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), Path::to_path_buf);

        if !path.exists() {
            if explicit {
                bail!("Config file not found: {}", path.display());
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse, expand and validate a config document
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).context("Invalid TOML format")?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sudo.prefix.is_empty() {
            bail!("sudo.prefix cannot be empty");
        }
        if !self.store_path.is_absolute() {
            bail!(
                "store_path must be absolute, got {}",
                self.store_path.display()
            );
        }
        if !self.home_root.is_absolute() {
            bail!("home_root must be absolute, got {}", self.home_root.display());
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        for path in [
            &mut self.work_dir,
            &mut self.store_path,
            &mut self.home_root,
            &mut self.passwd_file,
            &mut self.group_file,
            &mut self.sudo.dir,
        ] {
            *path = expand(path);
        }
    }

    /// Group files under a manifest root
    pub fn groups_path(&self, root: &Path) -> PathBuf {
        root.join(&self.groups_dir)
    }

    /// User files under a manifest root
    pub fn users_path(&self, root: &Path) -> PathBuf {
        root.join(&self.users_dir)
    }

    /// Sudoers fragments to manage
    pub fn sudo_grants(&self) -> SudoGrants {
        SudoGrants {
            dir: self.sudo.dir.clone(),
            prefix: self.sudo.prefix.clone(),
            groups: self.sudo.groups.clone(),
        }
    }

    /// Engine settings for one run
    pub fn run_options(&self, delete: bool, error_policy: ErrorPolicy) -> RunOptions {
        RunOptions {
            delete,
            home_root: self.home_root.clone(),
            error_policy,
            sudo: Some(self.sudo_grants()),
        }
    }
}

/// Expand a leading `~` in a path
pub fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}
