//! Configuration system for Tracery.
//!
//! Provides TOML-based configuration with:
//! - Optional sections for the graph store, relationship builder, queries,
//!   extraction, importance scoring and logging
//! - Config file layering (user config dir + project-local overrides)
//! - Validation of ranges and custom trigger patterns
//!
//! Every section falls back to the library defaults when absent.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
