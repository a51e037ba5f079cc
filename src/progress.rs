//! Terminal progress for reconciliation runs

use colored::Colorize;
use converge::{EntityKind, Outcome, Pass, ProgressCallback};

use crate::ui;

/// Prints one line per entity that changed, failed or was skipped
///
/// Unchanged entities are only counted; `verbose` lists them too.
pub struct Reporter {
    verbose: bool,
    quiet: bool,
    unchanged: usize,
}

impl Reporter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            unchanged: 0,
        }
    }
}

impl ProgressCallback for Reporter {
    fn on_pass_start(&mut self, pass: Pass) {
        self.unchanged = 0;
        if !self.quiet {
            ui::section(&pass.to_string());
        }
    }

    fn on_entity_complete(&mut self, kind: EntityKind, id: &str, outcome: &Outcome) {
        let label = format!("{kind} {id}");
        match outcome {
            Outcome::NoChange => {
                self.unchanged += 1;
                if self.verbose && !self.quiet {
                    ui::dim(&format!("{label} unchanged"));
                }
            }
            Outcome::Created => {
                if !self.quiet {
                    println!("  {} {}", "+".green(), label);
                }
            }
            Outcome::Updated { changes } => {
                if !self.quiet {
                    println!("  {} {} ({})", "~".yellow(), label, changes.join(", "));
                }
            }
            Outcome::Removed => {
                if !self.quiet {
                    println!("  {} {}", "-".red(), label);
                }
            }
            Outcome::Skipped { reason } => {
                if !self.quiet {
                    ui::dim(&format!("{label} skipped: {reason}"));
                }
            }
            Outcome::Failed { error } => {
                ui::error(&format!("{label}: {error}"));
            }
        }
    }

    fn on_pass_complete(&mut self, _pass: Pass) {
        if self.unchanged > 0 && !self.verbose && !self.quiet {
            ui::dim(&format!("{} unchanged", self.unchanged));
        }
    }
}
