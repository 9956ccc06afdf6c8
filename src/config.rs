//! Project configuration.
//!
//! Handles loading, validating, and merging `spear.toml`. The file lives in
//! the project root and is optional: stock defaults are used for every key
//! it does not set.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! project_name = "Spear"         # Replaces {{projectName}} in page heads
//! pages_dir = "src"              # Pages, assets and stylesheets
//! components_dir = "src/components"
//! dist_dir = "dist"              # Output directory, wiped on every build
//! site_url = ""                  # Base URL for sitemap entries
//! generate_sitemap = false
//! debug_mode = false             # Mark substituted content with data-spear attributes
//! link_base_url = ""             # Target of {%= type_#url %} links
//! max_pagination_count = 1000    # Record cap for [pagination] pages
//! pagination_boundary = "exact"  # or "late-by-one"
//! date_format = "YYYY年MM月DD日 hh時mm分ss秒"
//! date_only_format = "YYYY年MM月DD日"
//!
//! [content]
//! source = "fixture"             # or "markdown"
//! data_dir = "data"
//! markdown_extension = ".mdx"
//!
//! [plugins]
//! seo = "seo.yaml"               # Optional plugin settings files
//! i18n = "i18n.yaml"
//!
//! [processing]
//! max_processes = 4              # Max parallel page workers (omit for auto)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::fields::PatternDateFormatter;
use crate::fs::{Filesystem, FsError};
use crate::routing::BucketBoundary;
use crate::substitute::RenderOptions;

/// Name of the configuration file in the project root.
pub const CONFIG_FILE: &str = "spear.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `spear.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub project_name: String,
    /// Directory holding pages, assets and stylesheets.
    pub pages_dir: String,
    pub components_dir: String,
    pub dist_dir: String,
    pub site_url: String,
    pub generate_sitemap: bool,
    pub debug_mode: bool,
    pub link_base_url: String,
    /// Upper bound on records fetched for one `[pagination]` page, applied
    /// regardless of any `cms-option-limit`.
    pub max_pagination_count: usize,
    pub pagination_boundary: BucketBoundary,
    pub date_format: String,
    pub date_only_format: String,
    pub content: ContentConfig,
    pub plugins: PluginsConfig,
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let dates = PatternDateFormatter::default();
        Self {
            project_name: "Spear".into(),
            pages_dir: "src".into(),
            components_dir: "src/components".into(),
            dist_dir: "dist".into(),
            site_url: String::new(),
            generate_sitemap: false,
            debug_mode: false,
            link_base_url: String::new(),
            max_pagination_count: 1000,
            pagination_boundary: BucketBoundary::default(),
            date_format: dates.date_format,
            date_only_format: dates.date_only_format,
            content: ContentConfig::default(),
            plugins: PluginsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pagination_count == 0 {
            return Err(ConfigError::Validation(
                "max_pagination_count must be at least 1".into(),
            ));
        }
        if self.pages_dir.trim().is_empty() {
            return Err(ConfigError::Validation("pages_dir must not be empty".into()));
        }
        let dist = self.dist_dir.trim().trim_end_matches('/');
        if dist.is_empty() || dist == "." {
            return Err(ConfigError::Validation(
                "dist_dir must name a directory below the project root".into(),
            ));
        }
        if dist == self.pages_dir.trim().trim_end_matches('/') {
            return Err(ConfigError::Validation(
                "dist_dir must differ from pages_dir".into(),
            ));
        }
        if !self.content.markdown_extension.starts_with('.') {
            return Err(ConfigError::Validation(
                "content.markdown_extension must start with '.'".into(),
            ));
        }
        Ok(())
    }

    /// Substitution settings derived from this config.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            link_base_url: self.link_base_url.clone(),
            formatter: Arc::new(PatternDateFormatter {
                date_format: self.date_format.clone(),
                date_only_format: self.date_only_format.clone(),
            }),
            debug: self.debug_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSourceKind {
    /// JSON records, one file each.
    #[default]
    Fixture,
    /// Markdown with YAML front matter.
    Markdown,
}

/// Where content records come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentConfig {
    pub source: ContentSourceKind,
    /// Directory of `{content_type}/` subdirectories, relative to the root.
    pub data_dir: String,
    pub markdown_extension: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            source: ContentSourceKind::Fixture,
            data_dir: "data".into(),
            markdown_extension: ".mdx".into(),
        }
    }
}

/// Settings files for the built-in plugins. A plugin is enabled by naming
/// its file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i18n: Option<String>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of pages expanded in parallel.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `spear.toml` from a project root as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(fs: &dyn Filesystem, root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    if !fs.exists(&config_path) {
        return Ok(None);
    }
    let content = fs.read_text(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the project config, merged onto stock defaults and validated.
pub fn load_config(fs: &dyn Filesystem, root: &Path) -> Result<SiteConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(fs, root)?)
}

/// Returns a fully-commented stock `spear.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Spear Configuration
# ===================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# Replaces {{projectName}} inside <head> of every page.
project_name = "Spear"

# Pages, assets and stylesheets. Template files (.html, .htm, .spear) become
# pages; .scss is compiled to .css; everything else is copied verbatim.
pages_dir = "src"

# Component definitions. The file stem is the tag name: card.html -> <card>.
# Skipped during page discovery.
components_dir = "src/components"

# Output directory. Removed and rebuilt on every build.
dist_dir = "dist"

# Base URL for sitemap entries, e.g. "https://example.com".
site_url = ""

# Write sitemap.xml into the output directory.
generate_sitemap = false

# Mark substituted content with data-spear attributes for previews.
debug_mode = false

# Target page of {%= <type>_#url %} and {%= <type>_#link %} tokens.
link_base_url = ""

# Upper bound on records fetched for a [pagination] page.
max_pagination_count = 1000

# When a pagination bucket is full:
#   "exact"       - a bucket holds exactly cms-pagination-size items
#   "late-by-one" - a bucket takes one extra item (historical behavior)
pagination_boundary = "exact"

# Date patterns. Tokens: YYYY MM DD hh mm ss (zero padded).
date_format = "YYYY年MM月DD日 hh時mm分ss秒"
date_only_format = "YYYY年MM月DD日"

# ---------------------------------------------------------------------------
# Content
# ---------------------------------------------------------------------------
[content]
# "fixture"  - {data_dir}/{content_type}/*.json, one record per file
# "markdown" - {data_dir}/{content_type}/*{markdown_extension} with YAML front matter
source = "fixture"
data_dir = "data"
markdown_extension = ".mdx"

# ---------------------------------------------------------------------------
# Plugins
# ---------------------------------------------------------------------------
[plugins]
# SEO tags from a flat key/value YAML file.
# seo = "seo.yaml"

# Per-language copies of every page from a YAML dictionary.
# i18n = "i18n.yaml"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum pages expanded in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
