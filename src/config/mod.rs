// src/config/mod.rs

//! Configuration for datadag.
//!
//! - `model.rs`: the TOML-backed data model and the builders for the
//!   configured persistence engine and runner.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: the `RawConfigFile -> ConfigFile` conversion.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, RawConfigFile, RunnerKind, RunnerSection, StoreKind, StoreSection,
};
