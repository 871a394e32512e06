//! Command implementations for the affinity CLI.

pub mod presets;
pub mod run;
pub mod types;
