//! Configuration module for ki-browser-spoof.
//!
//! This module provides configuration management for the spoofing core:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides
//! - CLI argument overrides
//! - Validation and defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use ki_browser_spoof::config::SpoofSettings;
//!
//! // Create with defaults
//! let settings = SpoofSettings::default();
//!
//! // Load from a specific file
//! let settings = SpoofSettings::from_file("spoof.toml").unwrap();
//!
//! // Override with environment variables
//! let settings = settings.merge_with_env();
//! ```

mod settings;

pub use settings::{CliArgs, ConfigError, ShaderSettings, SpoofSettings, WorkerFallback};
