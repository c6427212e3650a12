//! Configuration module
//!
//! Loads and validates duel timing and penalty settings.

pub mod loader;
pub mod schema;

pub use loader::{apply_overrides, default_config, load_config, parse_config, validate};
pub use schema::{DuelConfig, GraceRange, Penalties};
