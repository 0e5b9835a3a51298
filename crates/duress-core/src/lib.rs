//! Panic-action engine: per-account actions run when the duress trigger fires.
//!
//! The messaging service lives behind ports (traits) implemented in adapter
//! crates.

pub mod actions;
pub mod bundle;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod location;
pub mod notifications;
pub mod ports;
pub mod runner;
pub mod store;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use errors::{Error, Result};
