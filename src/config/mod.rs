//! Configuration module for Natega-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key is optional; the built-in defaults describe the five public mirrors.
//!
//! # Example
//!
//! ```no_run
//! use natega_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Sweep will use {} endpoints", config.endpoints.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, EndpointEntry, OutputConfig, SweepConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
pub(crate) use validation::endpoint_base_url;
