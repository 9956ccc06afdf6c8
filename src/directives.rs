//! CMS directive expansion.
//!
//! Directives are `cms-*` attributes on ordinary elements. Expansion walks a
//! page in document order and rewrites three shapes:
//!
//! ```text
//! <div cms-item cms-content-type="blog" cms-content="abc">   single item: one fetch, one copy
//! <li cms-loop cms-content-type="blog" cms-option-limit="5"> list loop: one copy per record
//!   <span cms-loop cms-field="authors">                       sub-loop: nested records of the
//!                                                             record being rendered, no fetch
//! ```
//!
//! Elements marked `cms-ignore-static` are left for client-side rendering.
//! Every `cms-*` attribute on an expanded element is removed from the output.

use thiserror::Error;

use crate::content::{ContentSource, FetchError, InvalidOption, QueryOptions, Record};
use crate::fields::{format_fields, token};
use crate::markup::{Document, NodeId};
use crate::substitute::{RenderOptions, substitute};

pub const CMS_PREFIX: &str = "cms-";
const OPTION_PREFIX: &str = "cms-option-";

#[derive(Error, Debug)]
pub enum DirectiveError {
    #[error("<{tag} {directive}> needs a {attribute} attribute")]
    MissingAttribute {
        tag: String,
        directive: &'static str,
        attribute: &'static str,
    },
    #[error("cms-loop element doesn't have cms-field")]
    MissingField,
    #[error(transparent)]
    InvalidOption(#[from] InvalidOption),
    #[error("content fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Everything expansion needs besides the markup.
#[derive(Clone, Copy)]
pub struct ExpandContext<'a> {
    pub source: &'a dyn ContentSource,
    pub options: &'a RenderOptions,
}

/// Expand every single-item and list-loop directive in `doc`.
///
/// `skip` names an element the router expands itself; it and its subtree
/// are left untouched.
pub fn expand(
    doc: &mut Document,
    skip: Option<NodeId>,
    ctx: ExpandContext<'_>,
) -> Result<(), DirectiveError> {
    expand_children(doc, Document::ROOT, skip, ctx)
}

fn expand_children(
    doc: &mut Document,
    parent: NodeId,
    skip: Option<NodeId>,
    ctx: ExpandContext<'_>,
) -> Result<(), DirectiveError> {
    for child in doc.children(parent).to_vec() {
        if Some(child) == skip || !doc.is_element(child) {
            continue;
        }
        if is_single_item(doc, child) {
            expand_item(doc, child, ctx)?;
        } else if is_list_loop(doc, child) {
            expand_loop(doc, child, ctx)?;
        } else {
            expand_children(doc, child, skip, ctx)?;
        }
    }
    Ok(())
}

fn is_single_item(doc: &Document, id: NodeId) -> bool {
    doc.has_attr(id, "cms-item")
        && doc.has_attr(id, "cms-content-type")
        && doc.has_attr(id, "cms-content")
        && !doc.has_attr(id, "cms-ignore-static")
}

fn is_list_loop(doc: &Document, id: NodeId) -> bool {
    doc.has_attr(id, "cms-loop")
        && !doc.has_attr(id, "cms-tag-loop")
        && !doc.has_attr(id, "cms-ignore-static")
}

fn expand_item(doc: &mut Document, id: NodeId, ctx: ExpandContext<'_>) -> Result<(), DirectiveError> {
    let content_type = doc.attr(id, "cms-content-type").unwrap_or("").to_string();
    let content_id = doc.attr(id, "cms-content").unwrap_or("").to_string();
    let options = query_options(doc, id)?;
    prepare_template(doc, id, &content_type, ctx.options);

    let record = ctx.source.get_content(&content_type, &content_id, &options)?;
    let html = render_record(&doc.outer_html(id), &record, &content_type, &content_type, false, ctx)?;
    doc.replace_with_html(id, &html);
    Ok(())
}

fn expand_loop(doc: &mut Document, id: NodeId, ctx: ExpandContext<'_>) -> Result<(), DirectiveError> {
    let content_type = required_attr(doc, id, "cms-loop", "cms-content-type")?;
    let prefix = doc
        .attr(id, "cms-item-variable")
        .filter(|v| !v.is_empty())
        .unwrap_or(&content_type)
        .to_string();
    let options = query_options(doc, id)?;
    prepare_template(doc, id, &content_type, ctx.options);

    let template = doc.outer_html(id);
    let list = ctx.source.get_list(&content_type, &options)?;
    let html = list
        .data
        .iter()
        .map(|record| render_record(&template, record, &prefix, &content_type, true, ctx))
        .collect::<Result<String, _>>()?;
    doc.replace_with_html(id, &html);
    Ok(())
}

/// Read a directive attribute that must be present and non-empty.
pub(crate) fn required_attr(
    doc: &Document,
    id: NodeId,
    directive: &'static str,
    attribute: &'static str,
) -> Result<String, DirectiveError> {
    doc.attr(id, attribute)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DirectiveError::MissingAttribute {
            tag: doc.tag(id).unwrap_or("").to_string(),
            directive,
            attribute,
        })
}

/// Parse and remove the `cms-option-*` attributes of an element.
pub fn query_options(doc: &mut Document, id: NodeId) -> Result<QueryOptions, InvalidOption> {
    let mut options = QueryOptions::default();
    let candidates: Vec<(String, String)> = doc
        .attributes(id)
        .iter()
        .filter(|a| a.name.to_ascii_lowercase().starts_with(OPTION_PREFIX))
        .map(|a| (a.name.clone(), a.value.clone().unwrap_or_default()))
        .collect();
    for (name, value) in candidates {
        if options.set(&name[OPTION_PREFIX.len()..], &value)? {
            doc.remove_attr(id, &name);
        }
    }
    Ok(options)
}

pub fn strip_cms_attributes(doc: &mut Document, id: NodeId) {
    doc.retain_attrs(id, |a| !a.name.to_ascii_lowercase().starts_with(CMS_PREFIX));
}

/// Strip directives from the element that becomes the per-record template,
/// adding debug placeholders first when enabled.
pub(crate) fn prepare_template(
    doc: &mut Document,
    id: NodeId,
    content_type: &str,
    options: &RenderOptions,
) {
    strip_cms_attributes(doc, id);
    if options.debug {
        doc.set_attr(
            id,
            "data-spear-content-type",
            &token(&format!("{content_type}_#content_type")),
        );
        doc.set_attr(id, "data-spear-content", &token(&format!("{content_type}_#alias")));
    }
}

/// Render one record into a template: nested sub-loops first, then field
/// and metadata tokens.
pub fn render_record(
    template: &str,
    record: &Record,
    prefix: &str,
    namespace: &str,
    suppress_references: bool,
    ctx: ExpandContext<'_>,
) -> Result<String, DirectiveError> {
    let markup = if template.contains("cms-loop") {
        expand_sub_loops(template, record, prefix, ctx)?
    } else {
        template.to_string()
    };
    let replacements = format_fields(
        &record.fields,
        prefix,
        0,
        suppress_references,
        ctx.options.formatter.as_ref(),
    );
    Ok(substitute(&markup, &replacements, record, namespace, ctx.options))
}

/// Replace each `cms-loop cms-field` element with one copy per record held
/// in that field of `record`.
fn expand_sub_loops(
    template: &str,
    record: &Record,
    prefix: &str,
    ctx: ExpandContext<'_>,
) -> Result<String, DirectiveError> {
    let mut doc = Document::parse(template);
    let mut loops: Vec<NodeId> = doc.find_all(Document::ROOT, |d, n| {
        d.has_attr(n, "cms-loop") && !d.has_attr(n, "cms-ignore-static")
    });
    // Inner loops bind to nested records and are expanded by the recursion.
    loops.retain(|&n| !has_loop_ancestor(&doc, n));
    loops.sort_by_key(|&n| std::cmp::Reverse(doc.depth(n)));

    for id in loops {
        let field = doc
            .attr(id, "cms-field")
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .ok_or(DirectiveError::MissingField)?;
        let sub_prefix = doc
            .attr(id, "cms-item-variable")
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{prefix}_{field}"));
        strip_cms_attributes(&mut doc, id);
        let sub_template = doc.outer_html(id);
        let html = record
            .nested(&field)
            .iter()
            .map(|nested| render_record(&sub_template, nested, &sub_prefix, &sub_prefix, true, ctx))
            .collect::<Result<String, _>>()?;
        doc.replace_with_html(id, &html);
    }
    Ok(doc.to_html())
}

fn has_loop_ancestor(doc: &Document, id: NodeId) -> bool {
    let mut current = doc.parent(id);
    while let Some(p) = current {
        if doc.has_attr(p, "cms-loop") {
            return true;
        }
        current = doc.parent(p);
    }
    false
}
