//! Configuration loading, env substitution, and validation.
//!
//! Config files: `parley.toml`, `parley.yaml`, `parley.json`, or the legacy
//! `configuration.json`. Searched in `./` then `~/.config/parley/`.
//!
//! The configuration is read once at startup; sessions copy their defaults
//! from the cached value.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{discover_and_load, load_config},
    schema::{
        CompletionConfig, ModelsConfig, ParleyConfig, QuotaConfig, SessionDefaults,
        TelegramConfig, VisionOverride,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
