//! Reporter trait for dependency injection
//!
//! This trait allows the installer to report progress and status without
//! being coupled to a specific console implementation.

/// Progress sink for installer operations.
pub trait Reporter: Send + Sync {
    /// Indicates a new section has started (e.g. "Install libplist").
    fn section(&self, title: &str);

    /// An external command is about to run.
    fn step(&self, command: &str);

    /// A dependency needed no work.
    fn skipped(&self, name: &str, reason: &str);

    /// Updates the progress of a download.
    fn downloading(&self, name: &str, current: u64, total: Option<u64>);

    /// An archive is being unpacked.
    fn extracting(&self, name: &str);

    /// Marks a dependency as successfully installed.
    fn installed(&self, name: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a success message.
    fn success(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn step(&self, _: &str) {}
    fn skipped(&self, _: &str, _: &str) {}
    fn downloading(&self, _: &str, _: u64, _: Option<u64>) {}
    fn extracting(&self, _: &str) {}
    fn installed(&self, _: &str) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
}
