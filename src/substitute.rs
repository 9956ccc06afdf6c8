//! Field-token substitution.
//!
//! Applies a [`Replacement`] list to a markup string as literal
//! replace-all operations, in list order, then resolves the metadata
//! tokens that come from the record itself rather than a field:
//!
//! | Token | Value |
//! |-------|-------|
//! | `{%= ns_#url %}`, `{%= ns_#link %}` | `./{link_base_url}?contentId={alias}` |
//! | `{%= ns_#alias %}` | alias |
//! | `{%= ns_#uid %}` | public UID |
//! | `{%= ns_#content_type %}` | content type name |
//! | `{%= ns_#published_at %}`, `{%= ns_#updated_at %}` | formatted timestamp |
//!
//! In debug mode every field token is marked with its origin so a preview
//! can map output back to content: inside a quoted attribute value the
//! enclosing tag gets a `data-spear` attribute, anywhere else the text is
//! wrapped in `<span data-spear="…">`.

use std::sync::Arc;

use crate::content::Record;
use crate::fields::{DateFormatter, PatternDateFormatter, Replacement, format_date, token};

/// Settings shared by every substitution in a build.
#[derive(Clone)]
pub struct RenderOptions {
    pub link_base_url: String,
    pub formatter: Arc<dyn DateFormatter>,
    pub debug: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            link_base_url: String::new(),
            formatter: Arc::new(PatternDateFormatter::default()),
            debug: false,
        }
    }
}

impl std::fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOptions")
            .field("link_base_url", &self.link_base_url)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Substitute `replacements` and the metadata tokens of `record` into
/// `markup`. Tokens absent from the markup are no-ops.
pub fn substitute(
    markup: &str,
    replacements: &[Replacement],
    record: &Record,
    namespace: &str,
    options: &RenderOptions,
) -> String {
    let mut result = markup.to_string();
    for r in replacements {
        match (&r.field_id, options.debug) {
            (Some(field_id), true) => {
                let marker = format!("{namespace}--{}--{field_id}", record.alias);
                result = result
                    .replace(
                        &format!("\"{}\"", r.token),
                        &format!("\"{}\" data-spear=\"{marker}\"", r.text),
                    )
                    .replace(
                        &format!("'{}'", r.token),
                        &format!("'{}' data-spear='{marker}'", r.text),
                    )
                    .replace(
                        &r.token,
                        &format!("<span data-spear=\"{marker}\">{}</span>", r.text),
                    );
            }
            _ => result = result.replace(&r.token, &r.text),
        }
    }

    let link = format!("./{}?contentId={}", options.link_base_url, record.alias);
    let content_type = if record.content_type.is_empty() {
        namespace
    } else {
        &record.content_type
    };
    let timestamp = |raw: &Option<String>| {
        raw.as_deref()
            .map(|raw| format_date(options.formatter.as_ref(), raw, false))
            .unwrap_or_default()
    };
    let specials = [
        ("url", link.clone()),
        ("link", link),
        ("alias", record.alias.clone()),
        ("uid", record.public_uid.clone()),
        ("content_type", content_type.to_string()),
        ("published_at", timestamp(&record.published_at)),
        ("updated_at", timestamp(&record.updated_at)),
    ];
    for (name, value) in specials {
        let special = token(&format!("{namespace}_#{name}"));
        if result.contains(&special) {
            result = result.replace(&special, &value);
        }
    }
    result
}
