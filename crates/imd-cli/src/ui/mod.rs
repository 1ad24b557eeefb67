//! Console output

pub mod console;
pub mod progress;

pub use console::ConsoleReporter;
