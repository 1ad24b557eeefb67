//! Terminal implementation of [`Reporter`].

use std::io::Write;
use std::sync::Mutex;

use crossterm::style::Stylize;
use imd_core::Reporter;

use super::progress::format_progress;

/// Prints installer progress to stdout and problems to stderr.
///
/// Download progress redraws a single line; every other event ends that
/// line first.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    quiet: bool,
    progress_line: Mutex<bool>,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            progress_line: Mutex::new(false),
        }
    }

    /// Terminate a pending progress line.
    fn end_progress(&self) {
        if let Ok(mut active) = self.progress_line.lock() {
            if *active {
                println!();
                *active = false;
            }
        }
    }

    fn line(&self, text: impl std::fmt::Display) {
        if self.quiet {
            return;
        }
        self.end_progress();
        println!("{text}");
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        if self.quiet {
            return;
        }
        self.end_progress();
        println!();
        println!("{}", title.bold());
    }

    fn step(&self, command: &str) {
        self.line(format!("  {} {}", "$".dark_grey(), command.dark_grey()));
    }

    fn skipped(&self, name: &str, reason: &str) {
        self.line(format!(
            "  {} {name} {}",
            "-".dark_grey(),
            format!("({reason})").dark_grey()
        ));
    }

    fn downloading(&self, name: &str, current: u64, total: Option<u64>) {
        if self.quiet {
            return;
        }
        if let Ok(mut active) = self.progress_line.lock() {
            print!(
                "\r  {} {name} {}",
                "↓".cyan(),
                format_progress(current, total).dark_grey()
            );
            let _ = std::io::stdout().flush();
            *active = true;
        }
    }

    fn extracting(&self, name: &str) {
        self.line(format!("  {} extracting {name}", "…".cyan()));
    }

    fn installed(&self, name: &str) {
        self.line(format!("  {} {name}", "✓".green().bold()));
    }

    fn info(&self, msg: &str) {
        self.line(format!("  {msg}"));
    }

    fn success(&self, msg: &str) {
        self.end_progress();
        println!("{} {}", "✓".green().bold(), msg.green());
    }

    fn warning(&self, msg: &str) {
        self.end_progress();
        eprintln!("{} {msg}", "warning:".yellow().bold());
    }

    fn error(&self, msg: &str) {
        self.end_progress();
        eprintln!("{} {msg}", "error:".red().bold());
    }
}
