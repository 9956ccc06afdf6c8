//! Built-in plugins.
//!
//! Each plugin reads its settings file during the configuration hook and
//! rewrites pages in the after-build hook. [`register_builtin`] wires up the
//! plugins enabled in `[plugins]`.

mod i18n;
mod seo;

pub use i18n::I18nPlugin;
pub use seo::SeoPlugin;

use std::sync::Arc;

use crate::config::PluginsConfig;
use crate::hooks::HookRegistry;

/// Register the plugins named in `config`.
pub fn register_builtin(hooks: &mut HookRegistry, config: &PluginsConfig) {
    if let Some(file) = &config.seo {
        let seo = Arc::new(SeoPlugin::new(file));
        hooks.add_config(seo.clone());
        hooks.add_after_build(seo);
    }
    if let Some(file) = &config.i18n {
        let i18n = Arc::new(I18nPlugin::new(file));
        hooks.add_config(i18n.clone());
        hooks.add_after_build(i18n);
    }
}

/// A YAML scalar as plain text.
fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Tagged(tagged) => scalar_text(&tagged.value),
        _ => None,
    }
}
