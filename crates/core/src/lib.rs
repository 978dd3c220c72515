//! Core reconciliation engine for syncing Rubic master data into Tripletex
//! environments: change detection, identity mappings, run bookkeeping and
//! multi-environment orchestration.

pub mod endpoints;
pub mod errors;
pub mod settings;
pub mod sync;

pub use errors::{Error, Result};
