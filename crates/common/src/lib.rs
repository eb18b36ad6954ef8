//! Shared types, the error-context macro, and text utilities used across all parley crates.

pub mod error;
pub mod text;
pub mod types;

pub use error::FromMessage;
