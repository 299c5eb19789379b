//! Command implementations.

pub mod completions;
pub mod hash;
pub mod run;
pub mod status;
pub mod version;
