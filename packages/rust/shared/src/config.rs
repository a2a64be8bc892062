//! Build configuration for DataBook.
//!
//! A book's config lives at `<root>/databook.toml`; a user-wide fallback can
//! live at `~/.databook/databook.toml`. CLI flags override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DataBookError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "databook.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".databook";

// ---------------------------------------------------------------------------
// Config structs (matching databook.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Book identity used in watermarks.
    #[serde(default)]
    pub book: BookConfig,

    /// Source tree, build areas, and final output.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Reference document handling.
    #[serde(default)]
    pub references: ReferencesConfig,

    /// External tool commands.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Watermark placement.
    #[serde(default)]
    pub watermark: WatermarkConfig,

    /// Declared sources of prepared documents.
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

/// `[book]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    #[serde(default = "default_title")]
    pub title: String,

    /// Date shown in watermarks; today's local date when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datestamp: Option<String>,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            datestamp: None,
        }
    }
}

fn default_title() -> String {
    "DataBook".into()
}

/// `[paths]` section. Relative paths resolve against the book root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_root")]
    pub root: String,

    /// Authored build area (canonical PDFs, TOC, manifest).
    #[serde(default = "default_build")]
    pub build: String,

    /// Reference build area (stamped attachments).
    #[serde(default = "default_build_ref")]
    pub build_ref: String,

    /// Final bound document.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            build: default_build(),
            build_ref: default_build_ref(),
            output: default_output(),
        }
    }
}

fn default_root() -> String {
    ".".into()
}
fn default_build() -> String {
    ".build/authored".into()
}
fn default_build_ref() -> String {
    ".build/reference".into()
}
fn default_output() -> String {
    "databook.pdf".into()
}

/// `[references]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencesConfig {
    /// Embed reference documents as attachments of the final output.
    #[serde(default = "default_true")]
    pub attach: bool,
}

impl Default for ReferencesConfig {
    fn default() -> Self {
        Self { attach: true }
    }
}

fn default_true() -> bool {
    true
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Markdown renderer executable.
    #[serde(default = "default_pandoc")]
    pub pandoc: String,

    /// Extra renderer arguments for every document.
    #[serde(default)]
    pub pandoc_args: Vec<String>,

    /// Extra renderer arguments for section 0 (cover) documents.
    #[serde(default)]
    pub cover_args: Vec<String>,

    /// Attachment tool executable.
    #[serde(default = "default_pdftk")]
    pub pdftk: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pandoc: default_pandoc(),
            pandoc_args: Vec::new(),
            cover_args: Vec::new(),
            pdftk: default_pdftk(),
        }
    }
}

fn default_pandoc() -> String {
    "pandoc".into()
}
fn default_pdftk() -> String {
    "pdftk".into()
}

/// `[watermark]` section. Units are PDF points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Distance from the lower-left corner of the visible page area.
    #[serde(default = "default_margin")]
    pub margin: f32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            margin: default_margin(),
        }
    }
}

fn default_font_size() -> f32 {
    7.0
}
fn default_margin() -> f32 {
    12.0
}

/// `[[dependencies]]` entry: a prepared PDF and the file it was exported from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// Prepared document, relative to the root (e.g. `#1 Scope/#2&Appendix.pdf`).
    pub document: String,
    /// Source file, relative to the root.
    pub source: String,
}

// ---------------------------------------------------------------------------
// Build config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime build configuration with every path resolved.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub title: String,
    pub datestamp: String,
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub build_ref_dir: PathBuf,
    pub output: PathBuf,
    pub attach_references: bool,
    pub tools: ToolsConfig,
    pub watermark: WatermarkConfig,
    /// `(document, source)` pairs, both resolved against the root.
    pub dependencies: Vec<(PathBuf, PathBuf)>,
}

impl BuildConfig {
    /// Resolve an [`AppConfig`] against `base`, the directory holding the config file.
    pub fn resolve(config: &AppConfig, base: &Path) -> Self {
        let root = base.join(&config.paths.root);
        let datestamp = config
            .book
            .datestamp
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

        Self {
            title: config.book.title.clone(),
            datestamp,
            build_dir: root.join(&config.paths.build),
            build_ref_dir: root.join(&config.paths.build_ref),
            output: root.join(&config.paths.output),
            attach_references: config.references.attach,
            tools: config.tools.clone(),
            watermark: config.watermark.clone(),
            dependencies: config
                .dependencies
                .iter()
                .map(|d| (root.join(&d.document), root.join(&d.source)))
                .collect(),
            root,
        }
    }
}

impl From<&AppConfig> for BuildConfig {
    fn from(config: &AppConfig) -> Self {
        Self::resolve(config, Path::new("."))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the user config directory (`~/.databook/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DataBookError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Locate the config for a book rooted at `dir`: `dir/databook.toml`, then
/// the user-wide file. Returns `None` when neither exists.
pub fn find_config(dir: &Path) -> Result<Option<PathBuf>> {
    let local = dir.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }
    let global = config_dir()?.join(CONFIG_FILE_NAME);
    if global.exists() {
        return Ok(Some(global));
    }
    Ok(None)
}

/// Load the config for a book rooted at `dir`. Returns defaults if no file exists.
pub fn load_config(dir: &Path) -> Result<AppConfig> {
    match find_config(dir)? {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!(dir = %dir.display(), "config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DataBookError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        DataBookError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Write a default config file into `dir`. Returns the path to the created file.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| DataBookError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(DataBookError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DataBookError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DataBookError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs whose build areas would collide.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let paths = &config.paths;
    if paths.build == paths.build_ref {
        return Err(DataBookError::config(
            "paths.build and paths.build_ref must be different directories",
        ));
    }
    if config.watermark.font_size <= 0.0 {
        return Err(DataBookError::config("watermark.font_size must be positive"));
    }
    Ok(())
}
