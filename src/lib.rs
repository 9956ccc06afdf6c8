//! # Spear
//!
//! A component-based static site generator. Pages are HTML templates; custom
//! tags expand into reusable components; `cms-*` attributes pull records from
//! a content source and can fan one template out into many output pages.
//!
//! # Pipeline
//!
//! ```text
//! components/*.html ─┐
//!                    ├─ resolve components ─ expand directives ─ fan out routes ─ dist/
//! pages/**/*.html ───┘          │                   │                  │
//!                          css / scripts      content source     [alias] [tags]
//!                                                                 [pagination]
//! ```
//!
//! Each source page is expanded on its own freshly parsed tree, so pages are
//! built in parallel with no shared mutable state. The component registry is
//! read-only once expansion starts.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`markup`] | Lenient HTML parser and serializer over an index arena |
//! | [`html_tags`] | Built-in element names, used to reject colliding component names |
//! | [`content`] | Content records, the [`content::ContentSource`] trait, query options, local sources |
//! | [`fields`] | Field formatter: record fields to `{%= prefix_field %}` replacements |
//! | [`substitute`] | Token substitution, including `#url`, `#alias` and other record metadata |
//! | [`components`] | Component registry and resolver with slot filling |
//! | [`directives`] | `cms-item`, `cms-loop` and sub-loop expansion |
//! | [`routing`] | `[alias]`, `[tags]` and `[pagination]` page fan-out |
//! | [`hooks`] | Plugin hook traits and the ordered hook registry |
//! | [`plugins`] | Built-in SEO and i18n plugins |
//! | [`fs`] | Filesystem adapter: local disk and in-memory |
//! | [`sitemap`] | Sitemap XML |
//! | [`document`] | Final HTML document assembly |
//! | [`naming`] | Source file classification and logical page paths |
//! | [`types`] | Build state shared with hooks |
//! | [`pipeline`] | Build orchestration, cancellation and build report |
//! | [`config`] | `spear.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | Tracing subscriber setup |
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use spear::config::load_config;
//! use spear::fs::{Filesystem, LocalFs};
//! use spear::hooks::HookRegistry;
//! use spear::pipeline::{CancellationToken, Project, build};
//!
//! let fs: Arc<dyn Filesystem> = Arc::new(LocalFs);
//! let config = load_config(fs.as_ref(), Path::new(".")).unwrap();
//! let project = Project::new(".", fs, config);
//! let report = build(&project, &HookRegistry::new(), &CancellationToken::new()).unwrap();
//! println!("{} pages", report.pages.len());
//! ```

pub mod components;
pub mod config;
pub mod content;
pub mod directives;
pub mod document;
pub mod fields;
pub mod fs;
pub mod hooks;
pub mod html_tags;
pub mod logging;
pub mod markup;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod plugins;
pub mod routing;
pub mod sitemap;
pub mod substitute;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
