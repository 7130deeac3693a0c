//! Shared types, error model, and configuration for bookmark-reorg.
//!
//! This crate is the foundation depended on by all other bookmark-reorg crates.
//! It provides:
//! - [`ReorgError`]: the unified fatal error type, plus the per-record and
//!   per-batch error types ([`FetchError`], [`LlmError`], [`SchemaValidationError`])
//! - Domain types ([`BookmarkRecord`], [`PageMetadata`], [`RunId`])
//! - Configuration ([`AppConfig`], [`EnrichConfig`], [`CategorizeConfig`], config loading)
//! - Progress reporting ([`ProgressReporter`])

pub mod config;
pub mod error;
pub mod progress;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CategorizeConfig, DefaultsConfig, EnrichConfig, EnrichmentSection, LlmSection,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{FetchError, LlmError, ReorgError, Result, SchemaValidationError};
pub use progress::{ProgressReporter, SilentProgress};
pub use types::{BookmarkRecord, EnrichMode, PageMetadata, RunId};
