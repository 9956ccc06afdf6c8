//! Component registry and resolution.
//!
//! A component is a markup file under the components directory. Its file
//! stem, lower-cased, becomes a custom tag: `blog-title.html` is used as
//! `<blog-title></blog-title>`.
//!
//! Components are stored as minified source text only. Every use site parses
//! that text into a fresh [`Document`], so expansions never share tree state
//! and a component used five times on a page is parsed five times.
//!
//! ## Slots
//!
//! | Slots in component | Result |
//! |--------------------|--------|
//! | none | component markup as is; caller children are discarded |
//! | one | caller children if any, else the slot's own content |
//! | several | per `name`, the caller child with a matching `slot` attribute, else the slot's own content; unmatched caller children are dropped |
//!
//! ## Side channels
//!
//! While walking a tree the resolver also diverts `<style>` bodies to a CSS
//! buffer, inline `<script>` bodies outside `<head>` to a script buffer, and
//! collects `key`/`value`/`scoped` props.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::html_tags::is_builtin_tag;
use crate::markup::{Document, NodeId, minify};

/// Component nesting depth at which resolution gives up.
pub const MAX_COMPONENT_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    #[error("component {file} uses the built-in tag name <{tag}>")]
    BuiltinTagName { tag: String, file: String },
    #[error("components {first} and {second} both define <{tag}>")]
    Duplicate {
        tag: String,
        first: String,
        second: String,
    },
    #[error("component <{tag}> nests more than {MAX_COMPONENT_DEPTH} levels deep")]
    RecursionLimit { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Path relative to the components directory.
    pub file_name: String,
    pub tag_name: String,
    /// Minified source.
    pub raw_markup: String,
}

impl Component {
    /// A fresh tree for one use site.
    pub fn parse(&self) -> Document {
        Document::parse(&self.raw_markup)
    }
}

/// Components by tag name. Read-only once the build starts expanding pages.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, Component>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component from its file name and source.
    pub fn register(&mut self, file_name: &str, source: &str) -> Result<&Component, ComponentError> {
        let tag_name = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if is_builtin_tag(&tag_name) {
            return Err(ComponentError::BuiltinTagName {
                tag: tag_name,
                file: file_name.to_string(),
            });
        }
        if let Some(existing) = self.components.get(&tag_name) {
            return Err(ComponentError::Duplicate {
                tag: tag_name,
                first: existing.file_name.clone(),
                second: file_name.to_string(),
            });
        }
        let component = Component {
            file_name: file_name.to_string(),
            tag_name: tag_name.clone(),
            raw_markup: minify(source),
        };
        Ok(self.components.entry(tag_name).or_insert(component))
    }

    pub fn get(&self, tag: &str) -> Option<&Component> {
        self.components.get(&tag.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// What resolving a tree collected besides the rewritten markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub css: Vec<String>,
    pub scripts: Vec<String>,
    /// Props marked `scoped`, shared by the whole build.
    pub global_props: BTreeMap<String, String>,
    pub props: BTreeMap<String, String>,
}

impl Resolution {
    pub fn merge(&mut self, other: Resolution) {
        self.css.extend(other.css);
        self.scripts.extend(other.scripts);
        self.global_props.extend(other.global_props);
        self.props.extend(other.props);
    }
}

/// Expand every component tag in `doc` in place.
pub fn resolve(doc: &mut Document, registry: &ComponentRegistry) -> Result<Resolution, ComponentError> {
    let mut resolution = Resolution::default();
    resolve_children(doc, Document::ROOT, registry, 0, &mut resolution)?;
    Ok(resolution)
}

/// Resolve the body of one registered component, as a standalone check.
pub fn resolve_component(
    component: &Component,
    registry: &ComponentRegistry,
) -> Result<Resolution, ComponentError> {
    let mut doc = component.parse();
    let mut resolution = Resolution::default();
    resolve_children(&mut doc, Document::ROOT, registry, 1, &mut resolution)?;
    Ok(resolution)
}

fn resolve_children(
    doc: &mut Document,
    parent: NodeId,
    registry: &ComponentRegistry,
    depth: usize,
    out: &mut Resolution,
) -> Result<(), ComponentError> {
    for child in doc.children(parent).to_vec() {
        resolve_node(doc, child, registry, depth, out)?;
    }
    Ok(())
}

fn resolve_node(
    doc: &mut Document,
    id: NodeId,
    registry: &ComponentRegistry,
    depth: usize,
    out: &mut Resolution,
) -> Result<(), ComponentError> {
    let Some(tag) = doc.tag(id).map(str::to_ascii_lowercase) else {
        return Ok(());
    };

    if let Some(component) = registry.get(&tag) {
        if depth >= MAX_COMPONENT_DEPTH {
            return Err(ComponentError::RecursionLimit { tag });
        }
        let mut fragment = component.parse();
        fill_slots(&mut fragment, doc, id);
        resolve_children(&mut fragment, Document::ROOT, registry, depth + 1, out)?;
        doc.replace_with_document(id, &fragment);
        return Ok(());
    }

    match tag.as_str() {
        "style" => {
            out.css.push(doc.inner_html(id));
            doc.detach(id);
            return Ok(());
        }
        "script" if !doc.has_attr(id, "src") && !doc.has_ancestor(id, "head") => {
            out.scripts.push(doc.inner_html(id));
            doc.detach(id);
            return Ok(());
        }
        _ => {}
    }

    if let Some(key) = doc.attr(id, "key").map(str::to_string) {
        let value = doc.attr(id, "value").unwrap_or("").to_string();
        if doc.has_attr(id, "scoped") {
            out.global_props.insert(key, value);
        } else {
            out.props.insert(key, value);
        }
    }

    resolve_children(doc, id, registry, depth, out)
}

/// Put the caller's children into the slots of a freshly parsed component.
fn fill_slots(fragment: &mut Document, caller: &Document, caller_id: NodeId) {
    let slots = fragment.find_all(Document::ROOT, |d, n| d.has_tag(n, "slot"));
    match slots.as_slice() {
        [] => {}
        [slot] => {
            let inner = caller.inner_html(caller_id);
            if inner.is_empty() {
                fragment.unwrap(*slot);
            } else {
                fragment.replace_with_document(*slot, &Document::parse(&inner));
            }
        }
        _ => {
            for slot in slots {
                if !fragment.is_attached(slot) {
                    continue;
                }
                let provided = fragment.attr(slot, "name").and_then(|name| {
                    caller.find_first(caller_id, |d, n| d.attr(n, "slot") == Some(name))
                });
                match provided {
                    Some(node) => {
                        let mut piece = Document::parse(&caller.outer_html(node));
                        if let Some(&top) = piece.children(Document::ROOT).first() {
                            piece.remove_attr(top, "slot");
                        }
                        fragment.replace_with_document(slot, &piece);
                    }
                    None => fragment.unwrap(slot),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(components: &[(&str, &str)]) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for (file, source) in components {
            registry.register(file, source).unwrap();
        }
        registry
    }

    fn render(page: &str, registry: &ComponentRegistry) -> (String, Resolution) {
        let mut doc = Document::parse(page);
        let resolution = resolve(&mut doc, registry).unwrap();
        (doc.to_html(), resolution)
    }

    // =========================================================================
    // Registry
    // =========================================================================

    #[test]
    fn tag_name_is_lowercased_stem() {
        let registry = registry(&[("Blog-Title.html", "<h1>x</h1>")]);
        let component = registry.get("blog-title").unwrap();
        assert_eq!(component.tag_name, "blog-title");
        assert_eq!(component.file_name, "Blog-Title.html");
    }

    #[test]
    fn builtin_tag_name_is_rejected() {
        let mut registry = ComponentRegistry::new();
        let err = registry.register("header.html", "<div></div>").unwrap_err();
        assert_eq!(
            err,
            ComponentError::BuiltinTagName {
                tag: "header".into(),
                file: "header.html".into()
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let mut registry = registry(&[("card.html", "<div></div>")]);
        let err = registry.register("nested/card.spear", "<p></p>").unwrap_err();
        assert!(matches!(err, ComponentError::Duplicate { .. }));
    }

    #[test]
    fn source_is_minified_on_registration() {
        let registry = registry(&[("card.html", "\n  <div>\n    hi\n  </div>\n")]);
        assert_eq!(registry.get("card").unwrap().raw_markup, "<div>hi</div>");
    }

    // =========================================================================
    // Slots
    // =========================================================================

    #[test]
    fn slotless_component_discards_caller_children() {
        let registry = registry(&[("logo.html", "<img src=\"logo.png\">")]);
        let (html, _) = render("<logo>ignored</logo>", &registry);
        assert_eq!(html, "<img src=\"logo.png\">");
    }

    #[test]
    fn single_slot_falls_back_to_default() {
        let registry = registry(&[("btn.html", "<button><slot>Click</slot></button>")]);
        let (html, _) = render("<btn></btn>", &registry);
        assert_eq!(html, "<button>Click</button>");
    }

    #[test]
    fn single_slot_uses_caller_markup() {
        let registry = registry(&[("btn.html", "<button><slot>Click</slot></button>")]);
        let (html, _) = render("<btn><b>Buy</b> now</btn>", &registry);
        assert_eq!(html, "<button><b>Buy</b> now</button>");
    }

    #[test]
    fn named_slots_match_by_attribute() {
        let registry = registry(&[(
            "card.html",
            "<div><header-slot><slot name=\"title\">Untitled</slot></header-slot><slot name=\"body\">Empty</slot></div>",
        )]);
        let (html, _) = render(
            "<card><p slot=\"body\">Text</p><span>dropped</span></card>",
            &registry,
        );
        assert_eq!(html, "<div><header-slot>Untitled</header-slot><p>Text</p></div>");
    }

    #[test]
    fn each_use_parses_a_fresh_tree() {
        let registry = registry(&[("btn.html", "<button><slot>Click</slot></button>")]);
        let (html, _) = render("<btn>A</btn><btn></btn><btn>B</btn>", &registry);
        assert_eq!(html, "<button>A</button><button>Click</button><button>B</button>");
    }

    // =========================================================================
    // Nesting
    // =========================================================================

    #[test]
    fn nested_components_resolve() {
        let registry = registry(&[
            ("icon.html", "<i class=\"icon\"></i>"),
            ("btn.html", "<button><icon></icon><slot></slot></button>"),
        ]);
        let (html, _) = render("<nav><btn>Go</btn></nav>", &registry);
        assert_eq!(html, "<nav><button><i class=\"icon\"></i>Go</button></nav>");
    }

    #[test]
    fn caller_children_inside_slots_resolve() {
        let registry = registry(&[
            ("icon.html", "<i></i>"),
            ("btn.html", "<button><slot></slot></button>"),
        ]);
        let (html, _) = render("<btn><icon></icon></btn>", &registry);
        assert_eq!(html, "<button><i></i></button>");
    }

    #[test]
    fn self_reference_hits_recursion_limit() {
        let registry = registry(&[("loop-me.html", "<div><loop-me></loop-me></div>")]);
        let mut doc = Document::parse("<loop-me></loop-me>");
        let err = resolve(&mut doc, &registry).unwrap_err();
        assert_eq!(err, ComponentError::RecursionLimit { tag: "loop-me".into() });
        let component = registry.get("loop-me").unwrap();
        assert!(resolve_component(component, &registry).is_err());
    }

    // =========================================================================
    // Side channels
    // =========================================================================

    #[test]
    fn styles_and_body_scripts_are_diverted() {
        let registry = registry(&[("card.html", "<style>.card{}</style><div class=\"card\"></div>")]);
        let (html, resolution) = render(
            "<html><head><script>head()</script></head><body><card></card><script>body()</script><script src=\"x.js\"></script></body></html>",
            &registry,
        );
        assert_eq!(
            html,
            "<html><head><script>head()</script></head><body><div class=\"card\"></div><script src=\"x.js\"></script></body></html>"
        );
        assert_eq!(resolution.css, vec![".card{}"]);
        assert_eq!(resolution.scripts, vec!["body()"]);
    }

    #[test]
    fn props_split_by_scope() {
        let (_, resolution) = render(
            "<meta key=\"title\" value=\"Home\"><meta key=\"site\" value=\"Spear\" scoped><div></div>",
            &ComponentRegistry::new(),
        );
        assert_eq!(resolution.props.get("title").map(String::as_str), Some("Home"));
        assert_eq!(resolution.global_props.get("site").map(String::as_str), Some("Spear"));
        assert!(!resolution.props.contains_key("site"));
    }
}
