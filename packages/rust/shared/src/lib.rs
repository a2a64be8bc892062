//! Shared types, error model, and configuration for DataBook.
//!
//! This crate is the foundation depended on by all other DataBook crates.
//! It provides:
//! - [`DataBookError`]: the unified error type
//! - Domain types ([`CanonicalName`], [`DocumentKind`], [`TocEntry`], [`BookmarkTree`], [`BuildManifest`])
//! - Configuration ([`AppConfig`], [`BuildConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BookConfig, BuildConfig, CONFIG_FILE_NAME, DependencyEntry, PathsConfig,
    ReferencesConfig, ToolsConfig, WatermarkConfig, config_dir, find_config, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{DataBookError, Result};
pub use types::{
    Bookmark, BookmarkTree, BuildManifest, CURRENT_SCHEMA_VERSION, CanonicalName, Document,
    DocumentKind, MAX_NUMBER, ManifestEntry, Section, TocEntry, validate_name, validate_number,
};
