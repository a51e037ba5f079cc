//! Account commands backed by shadow-utils

use crate::context::{AccountCommands, CommandRunner, NewAccount};
use crate::error::{Error, Result};

/// [`AccountCommands`] implemented with `groupadd`, `useradd`, `usermod`,
/// `gpasswd` and friends
pub struct ShadowUtils<R> {
    runner: R,
}

impl<R: CommandRunner> ShadowUtils<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// The underlying runner
    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: CommandRunner> AccountCommands for ShadowUtils<R> {
    fn create_group(&self, group: &str) -> Result<()> {
        self.runner.run_checked("groupadd", &[group])
    }

    fn delete_group(&self, group: &str) -> Result<()> {
        self.runner.run_checked("groupdel", &[group])
    }

    fn create_user(&self, account: &NewAccount) -> Result<()> {
        let home = account
            .home
            .to_str()
            .ok_or_else(|| Error::InvalidId(account.home.display().to_string()))?;
        let groups = account.groups.join(",");

        let mut args = vec!["--shell", account.shell.as_str(), "--home", home];
        if !groups.is_empty() {
            args.extend(["--groups", groups.as_str()]);
        }
        args.extend(["--create-home", account.name.as_str()]);

        self.runner.run_checked("useradd", &args)
    }

    fn delete_user(&self, user: &str) -> Result<()> {
        self.runner.run_checked("userdel", &["--remove", user])
    }

    fn add_to_group(&self, user: &str, group: &str) -> Result<()> {
        self.runner.run_checked("usermod", &["-a", "-G", group, user])
    }

    fn remove_from_group(&self, user: &str, group: &str) -> Result<()> {
        self.runner.run_checked("gpasswd", &["-d", user, group])
    }

    fn set_shell(&self, user: &str, shell: &str) -> Result<()> {
        self.runner.run_checked("usermod", &["--shell", shell, user])
    }
}
