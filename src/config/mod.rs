//! Configuration Module
//!
//! ## Loading Order
//!
//! 1. `CASETA_CONFIG` environment variable (path to TOML file)
//! 2. `caseta.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded [`CasetaConfig`] is passed by reference to whatever it
//! configures; there is no process-wide instance.

mod caseta_config;
pub mod defaults;
pub mod validation;

pub use caseta_config::*;
