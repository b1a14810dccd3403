//! Configuration module for stylebook
//!
//! Provides types and parsing for `stylebook.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config, load_project, ConfigError, LoadedConfig};
pub use schema::*;
