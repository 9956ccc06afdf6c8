//! Centralized source file classification and page naming.
//!
//! Every file under the pages directory is one of three kinds, decided by
//! extension (case-insensitive):
//!
//! - `.html`, `.htm`, `.spear` → template, becomes one or more pages
//! - `.scss` → stylesheet, compiled to `.css` next to where it was found
//! - anything else → asset, copied verbatim
//!
//! ## Logical paths
//!
//! A template's logical path is its relative path with `/` separators, a
//! leading `/`, and no extension. Routing placeholders stay literal:
//! - `index.html` → `/index`
//! - `blog/[alias].spear` → `/blog/[alias]`
//! - `tags/[tags]/[pagination].html` → `/tags/[tags]/[pagination]`

use std::path::Path;

pub const TEMPLATE_EXTENSIONS: &[&str] = &["html", "htm", "spear"];

const PLACEHOLDERS: &[&str] = &["[alias]", "[tags]", "[tag]", "[pagination]"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Template,
    Stylesheet,
    Asset,
}

/// Classify a source file by extension.
pub fn classify(path: &Path) -> SourceKind {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if TEMPLATE_EXTENSIONS.contains(&ext.as_str()) {
        SourceKind::Template
    } else if ext == "scss" {
        SourceKind::Stylesheet
    } else {
        SourceKind::Asset
    }
}

/// Relative path with `/` separators, whatever the platform.
pub fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Logical page path for a template at `rel` (relative to the pages dir).
pub fn logical_path(rel: &Path) -> String {
    format!("/{}", slash_path(&rel.with_extension("")))
}

/// Output path of a compiled stylesheet, relative to the output dir.
pub fn stylesheet_output(rel: &Path) -> String {
    slash_path(&rel.with_extension("css"))
}

/// Output file of a page, relative to the output dir.
pub fn page_file(logical: &str) -> String {
    format!("{}.html", logical.trim_start_matches('/'))
}

/// Whether a logical path still has routing placeholders.
pub fn has_placeholder(logical: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| logical.contains(p))
}
