//! Page localization.
//!
//! Settings file:
//!
//! ```yaml
//! settings:
//!   default: en
//! lang:
//!   en:
//!     - title: Blog
//!     - description: This is a blog.
//!   ja:
//!     - title: ブログ
//! ```
//!
//! Every page is emitted once per language under `/{lang}/…`; the default
//! language is also emitted at the original paths. Per language:
//!
//! - `<h1 i18n="title">…</h1>` gets the word as content, the attribute is dropped
//! - `<spear-link href="/about">` becomes `<a href="/{lang}/about">`
//! - `{%= t("title") %}` / `{%= translate("title") %}` become the word
//! - `{%= l("/about") %}` / `{%= localize("/about") %}` become `/{lang}/about`
//!
//! Keys without a word are left as they are. Assets are copied under every
//! language directory.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::{LazyLock, RwLock};
use tracing::debug;

use super::scalar_text;
use crate::config::SiteConfig;
use crate::document::ensure_document;
use crate::hooks::{AfterBuildHook, ConfigHook, Hook, HookEnv, HookError};
use crate::markup::Document;
use crate::types::{Asset, BuildState};

static TRANSLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%= (?:translate|t)\(\s*["']([^"']*)["']\s*\) %\}"#).unwrap()
});

static LOCALIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%= (?:localize|l)\(\s*["']([^"']*)["']\s*\) %\}"#).unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Languages {
    default: Option<String>,
    /// Language code → key → word, in file order.
    words: Vec<(String, BTreeMap<String, String>)>,
}

pub struct I18nPlugin {
    settings_file: String,
    languages: RwLock<Languages>,
}

impl I18nPlugin {
    pub fn new(settings_file: &str) -> Self {
        Self {
            settings_file: settings_file.to_string(),
            languages: RwLock::new(Languages::default()),
        }
    }

    fn languages(&self) -> Languages {
        self.languages.read().map(|l| l.clone()).unwrap_or_default()
    }
}

fn parse_settings(source: &str) -> Result<Languages, HookError> {
    let root: serde_yaml::Mapping = serde_yaml::from_str(source)?;
    let mut languages = Languages::default();
    for (key, value) in &root {
        let key = scalar_text(key).unwrap_or_default();
        if key.eq_ignore_ascii_case("settings") {
            languages.default = value.get("default").and_then(scalar_text);
        } else if key == "lang" {
            let Some(langs) = value.as_mapping() else {
                return Err(HookError::Failed("i18n: lang must be a mapping".into()));
            };
            for (code, entries) in langs {
                let mut words = BTreeMap::new();
                for entry in entries.as_sequence().into_iter().flatten() {
                    for (k, v) in entry.as_mapping().into_iter().flatten() {
                        if let (Some(k), Some(v)) = (scalar_text(k), scalar_text(v)) {
                            words.insert(k, v);
                        }
                    }
                }
                let code = scalar_text(code).unwrap_or_default().to_lowercase();
                languages.words.push((code, words));
            }
        } else {
            return Err(HookError::Failed(format!("i18n: invalid key name [{key}]")));
        }
    }
    Ok(languages)
}

/// One page in one language.
fn localize(markup: &str, lang: &str, words: &BTreeMap<String, String>) -> String {
    let mut doc = Document::parse(&ensure_document(markup));

    for id in doc.find_all(Document::ROOT, |d, n| d.has_attr(n, "i18n")) {
        let Some(word) = doc.attr(id, "i18n").and_then(|key| words.get(key)) else {
            continue;
        };
        doc.remove_attr(id, "i18n");
        doc.set_inner_html(id, word);
    }

    for id in doc.find_all(Document::ROOT, |d, n| d.has_tag(n, "spear-link")) {
        let Some(href) = doc.attr(id, "href").filter(|h| h.starts_with('/')) else {
            continue;
        };
        let href = format!("/{lang}{href}");
        doc.set_attr(id, "href", &href);
        doc.rename(id, "a");
    }

    let html = doc.to_html();
    let html = TRANSLATE.replace_all(&html, |caps: &Captures| match words.get(&caps[1]) {
        Some(word) => word.clone(),
        None => caps[0].to_string(),
    });
    LOCALIZE
        .replace_all(&html, |caps: &Captures| {
            let url = &caps[1];
            match url.strip_prefix('/') {
                Some(rest) => format!("/{lang}/{rest}"),
                None => format!("{lang}/{url}"),
            }
        })
        .into_owned()
}

impl Hook for I18nPlugin {
    fn name(&self) -> &str {
        "spear-i18n"
    }
}

impl ConfigHook for I18nPlugin {
    fn configure(
        &self,
        _config: &SiteConfig,
        env: HookEnv<'_>,
    ) -> Result<Option<SiteConfig>, HookError> {
        let source = env.fs.read_text(&env.root.join(&self.settings_file))?;
        let languages = parse_settings(&source)?;
        debug!(languages = languages.words.len(), "loaded i18n settings");
        let mut slot = self
            .languages
            .write()
            .map_err(|_| HookError::Failed("i18n settings lock poisoned".into()))?;
        *slot = languages;
        Ok(None)
    }
}

impl AfterBuildHook for I18nPlugin {
    fn after_build(&self, state: &BuildState) -> Result<Option<BuildState>, HookError> {
        let languages = self.languages();
        if languages.words.is_empty() {
            return Ok(None);
        }

        let mut pages = Vec::new();
        let mut assets = state.assets.clone();
        if let Some((lang, words)) = languages
            .default
            .as_ref()
            .and_then(|d| languages.words.iter().find(|(code, _)| code.eq_ignore_ascii_case(d)))
        {
            for page in &state.pages {
                pages.push(page.derive(page.path.clone(), localize(&page.markup, lang, words)));
            }
        }
        for (lang, words) in &languages.words {
            for page in &state.pages {
                let path = format!("/{lang}{}", page.path);
                pages.push(page.derive(path, localize(&page.markup, lang, words)));
            }
            assets.extend(state.assets.iter().map(|asset| Asset {
                path: format!("{lang}/{}", asset.path),
                bytes: asset.bytes.clone(),
            }));
        }

        Ok(Some(BuildState {
            pages,
            assets,
            ..state.clone()
        }))
    }
}
