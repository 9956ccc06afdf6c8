//! SEO tags.
//!
//! Settings file: a flat YAML mapping. Every key is available in pages as
//! `{%= #seo_{key} %}`:
//!
//! ```yaml
//! title: Blog site
//! description: Notes on Rust
//! ```
//!
//! A page may carry one `<spear-seo>` element, turned into head elements:
//!
//! ```text
//! <spear-seo title="Home" meta-description="…" link-canonical="https://…">
//!   → <title>Home</title>
//!     <meta name="description" content="…">
//!     <link rel="canonical" href="https://…">
//! ```

use std::sync::RwLock;
use tracing::debug;

use super::scalar_text;
use crate::config::SiteConfig;
use crate::document::ensure_document;
use crate::fields::token;
use crate::hooks::{AfterBuildHook, ConfigHook, Hook, HookEnv, HookError};
use crate::markup::Document;
use crate::types::BuildState;

pub struct SeoPlugin {
    settings_file: String,
    values: RwLock<Vec<(String, String)>>,
}

impl SeoPlugin {
    pub fn new(settings_file: &str) -> Self {
        Self {
            settings_file: settings_file.to_string(),
            values: RwLock::new(Vec::new()),
        }
    }

    fn values(&self) -> Vec<(String, String)> {
        self.values.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// Apply settings tokens and the `<spear-seo>` element to one page.
    fn apply(&self, markup: &str, values: &[(String, String)]) -> String {
        let mut html = ensure_document(markup);
        for (key, value) in values {
            html = html.replace(&token(&format!("#seo_{key}")), value);
        }

        let mut doc = Document::parse(&html);
        let Some(seo) = doc.find_first(Document::ROOT, |d, n| d.has_tag(n, "spear-seo")) else {
            return html;
        };
        let tags: Vec<String> = doc
            .attributes(seo)
            .iter()
            .filter_map(|attr| {
                let value = attr.value.as_deref().unwrap_or("");
                let name = attr.name.to_ascii_lowercase();
                if name == "title" {
                    Some(format!("<title>{value}</title>"))
                } else if let Some(meta) = name.strip_prefix("meta-") {
                    Some(format!("<meta name=\"{meta}\" content=\"{value}\">"))
                } else {
                    name.strip_prefix("link-")
                        .map(|rel| format!("<link rel=\"{rel}\" href=\"{value}\">"))
                }
            })
            .collect();
        if let Some(head) = doc.find_first(Document::ROOT, |d, n| d.has_tag(n, "head")) {
            for tag in &tags {
                doc.append_html(head, tag);
            }
        }
        doc.detach(seo);
        doc.to_html()
    }
}

impl Hook for SeoPlugin {
    fn name(&self) -> &str {
        "spear-seo"
    }
}

impl ConfigHook for SeoPlugin {
    fn configure(
        &self,
        _config: &SiteConfig,
        env: HookEnv<'_>,
    ) -> Result<Option<SiteConfig>, HookError> {
        let source = env.fs.read_text(&env.root.join(&self.settings_file))?;
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(&source)?;
        let values: Vec<(String, String)> = mapping
            .iter()
            .filter_map(|(k, v)| Some((scalar_text(k)?, scalar_text(v)?)))
            .collect();
        debug!(count = values.len(), "loaded SEO settings");
        let mut slot = self
            .values
            .write()
            .map_err(|_| HookError::Failed("SEO settings lock poisoned".into()))?;
        *slot = values;
        Ok(None)
    }
}

impl AfterBuildHook for SeoPlugin {
    fn after_build(&self, state: &BuildState) -> Result<Option<BuildState>, HookError> {
        let values = self.values();
        let mut next = state.clone();
        for page in &mut next.pages {
            page.markup = self.apply(&page.markup, &values);
        }
        Ok(Some(next))
    }
}
