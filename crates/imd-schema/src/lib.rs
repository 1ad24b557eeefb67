//! Shared data model for `imd-bootstrap`.
//!
//! Pure data: the dependency manifest and the host platform table. Nothing in
//! this crate spawns processes or touches the network.

pub mod manifest;
pub mod platform;

// Re-exports
pub use manifest::*;
pub use platform::*;
