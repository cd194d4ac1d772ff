//! Shared fixtures, configs and assertions for the end-to-end tests
//!
//! Each test binary uses a different subset, hence the `dead_code` allowances.

#![allow(dead_code, unused_imports)]

pub mod assertions;
pub mod config;
pub mod fixtures;

pub use assertions::*;
pub use config::*;
pub use fixtures::*;
