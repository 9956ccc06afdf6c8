//! Build state shared between pipeline stages and hooks.
//!
//! Hooks receive the state by reference and hand back a modified copy, so
//! everything here is plain owned data that clones deeply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::components::Component;

/// A routable output unit.
///
/// `path` is the logical path without extension, starting with `/`
/// (`/index`, `/blog/[alias]`). Before routing it may contain the
/// placeholders `[alias]`, `[tags]`, `[tag]` and `[pagination]`; after
/// routing it names the output file `{dist}{path}.html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub path: String,
    pub markup: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, String>,
}

impl Page {
    pub fn new(path: &str, markup: &str) -> Self {
        Self {
            path: path.to_string(),
            markup: markup.to_string(),
            props: BTreeMap::new(),
        }
    }

    /// Same page under a different path and markup.
    pub fn derive(&self, path: String, markup: String) -> Self {
        Self {
            path,
            markup,
            props: self.props.clone(),
        }
    }
}

/// A non-template file copied to the output verbatim. `path` is relative
/// to the pages directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Everything a build has produced so far.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    pub pages: Vec<Page>,
    pub components: Vec<Component>,
    pub assets: Vec<Asset>,
    /// Diverted `<style>` bodies, in page order.
    pub css: Vec<String>,
    /// Diverted inline `<script>` bodies, in page order.
    pub scripts: Vec<String>,
    pub global_props: BTreeMap<String, String>,
}
