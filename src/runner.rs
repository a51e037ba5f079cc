use converge::{CommandOutput, CommandRunner, Error};
use std::process::{Command, Stdio};

/// Runs account commands on the local machine, capturing their output
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> converge::Result<CommandOutput> {
        log::debug!("Running: {}", converge::error::command_line(cmd, args));

        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                command: converge::error::command_line(cmd, args),
                source,
            })?;

        if !output.status.success() {
            log::debug!(
                "{} exited with {}: {}",
                cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.into())
    }
}

/// Prints account commands instead of running them
pub struct PrintRunner;

impl CommandRunner for PrintRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> converge::Result<CommandOutput> {
        crate::ui::dim(&format!("would run: {}", converge::error::command_line(cmd, args)));
        Ok(CommandOutput::ok())
    }
}
