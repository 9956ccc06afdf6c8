//! Page fan-out.
//!
//! A page whose logical path contains a routing placeholder becomes a set
//! of output pages. The placeholder decides the shape and the first
//! matching directive element in the page supplies the records:
//!
//! | Path contains | Element | Output |
//! |---------------|---------|--------|
//! | `[pagination]` | `cms-loop` | one page per bucket of `cms-pagination-size` records |
//! | `[pagination]` + `[tag]` | `cms-loop cms-tag-loop` | buckets per distinct tag |
//! | `[tags]` + `[alias]` | `cms-item cms-tag-loop` | one page per record and tag |
//! | `[tags]` | `cms-loop cms-tag-loop` | one page per distinct tag, listing its records |
//! | `[alias]` | `cms-item` | one page per record |
//! | nothing | | the page itself |
//!
//! An `[alias]` page without a usable `cms-item` is skipped. `cms-tag-loop`
//! names the tags field of the records. Routing hooks see every routed page
//! first; when one handles it, the default expansion is not run.
//!
//! Pagination navigation lives in an element marked `cms-pagination` with
//! the same `cms-loop-id` as the loop. Its `{%= pagination_prev %}`,
//! `{%= pagination_next %}`, `{%= pagination_current_page %}` and
//! `{%= pagination_total %}` tokens are filled in per bucket.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::content::Record;
use crate::directives::{
    DirectiveError, ExpandContext, prepare_template, query_options, render_record, required_attr,
    strip_cms_attributes,
};
use crate::fields::token;
use crate::hooks::{HookRegistry, PaginationRequest};
use crate::markup::{Document, NodeId};
use crate::types::Page;

/// Records per page when `cms-pagination-size` is absent or invalid.
pub const DEFAULT_PAGE_SIZE: usize = 10;

const ALIAS: &str = "[alias]";
const TAGS: &str = "[tags]";
const TAG: &str = "[tag]";
const PAGINATION: &str = "[pagination]";

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("{path}: [pagination] pages need a cms-loop element")]
    MissingLoop { path: String },
    #[error("{path}: cms-tag-loop on a cms-item needs an [alias] segment in the path")]
    TagLoopWithoutAlias { path: String },
    #[error(transparent)]
    Directive(#[from] DirectiveError),
}

// ============================================================================
// Pagination buckets
// ============================================================================

/// When a pagination bucket counts as full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketBoundary {
    /// A bucket holds exactly the page size.
    #[default]
    Exact,
    /// A bucket takes one record more than the page size.
    LateByOne,
}

impl BucketBoundary {
    /// Records a bucket holds before the next one starts.
    pub fn capacity(self, size: usize) -> usize {
        let size = size.max(1);
        match self {
            BucketBoundary::Exact => size,
            BucketBoundary::LateByOne => size + 1,
        }
    }
}

/// Rendered records of one output page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub html: String,
    pub count: usize,
    /// 1-based page number.
    pub page: usize,
}

/// Split rendered fragments into pages. Always returns at least one
/// bucket, so an empty list still produces page 1.
pub fn paginate<I>(fragments: I, size: usize, boundary: BucketBoundary) -> Vec<Bucket>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let capacity = boundary.capacity(size);
    let mut buckets = vec![Bucket {
        html: String::new(),
        count: 0,
        page: 1,
    }];
    for fragment in fragments {
        if buckets.last().is_some_and(|b| b.count >= capacity) {
            let page = buckets.len() + 1;
            buckets.push(Bucket {
                html: String::new(),
                count: 0,
                page,
            });
        }
        if let Some(bucket) = buckets.last_mut() {
            bucket.html.push_str(fragment.as_ref());
            bucket.count += 1;
        }
    }
    buckets
}

/// Fill the pagination navigation tokens of `html`. Links are `path` with
/// `[pagination]` replaced by the neighbouring page numbers.
pub fn replace_nav_tokens(html: &str, path: &str, page: usize, total: usize) -> String {
    let link = |n: usize| path.replace(PAGINATION, &n.to_string());
    html.replace(&token("pagination_prev"), &link(page.saturating_sub(1)))
        .replace(&token("pagination_next"), &link(page + 1))
        .replace(&token("pagination_current_page"), &page.to_string())
        .replace(&token("pagination_total"), &total.to_string())
}

// ============================================================================
// Route selection
// ============================================================================

/// Settings for expanding one page.
#[derive(Clone, Copy)]
pub struct RouteContext<'a> {
    pub expand: ExpandContext<'a>,
    pub hooks: &'a HookRegistry,
    /// Fetch limit for pagination lists, overriding `cms-option-limit`.
    pub max_pagination_count: usize,
    pub boundary: BucketBoundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    PassThrough,
    Skip,
    MissingLoop,
    Pagination(NodeId),
    TagAlias(NodeId),
    TagList(NodeId),
    Alias(NodeId),
}

fn plan(doc: &Document, path: &str) -> Route {
    let usable = |names: &[&str]| {
        doc.find_with_attrs(Document::ROOT, names)
            .filter(|&n| !doc.has_attr(n, "cms-ignore-static"))
    };

    if path.contains(PAGINATION) {
        return doc
            .find_with_attrs(Document::ROOT, &["cms-loop"])
            .map_or(Route::MissingLoop, Route::Pagination);
    }
    if path.contains(TAGS) {
        if let Some(id) = usable(&["cms-item", "cms-tag-loop"]) {
            return Route::TagAlias(id);
        }
        if let Some(id) = usable(&["cms-loop", "cms-tag-loop"]) {
            return Route::TagList(id);
        }
        return match usable(&["cms-item"]) {
            Some(id) if path.contains(ALIAS) => Route::Alias(id),
            Some(_) => Route::PassThrough,
            None => Route::Skip,
        };
    }
    if path.contains(ALIAS) {
        return usable(&["cms-item"]).map_or(Route::Skip, Route::Alias);
    }
    Route::PassThrough
}

/// The element the router expands for a page at `path`, if any. Directive
/// expansion must leave it alone.
pub fn route_element(doc: &Document, path: &str) -> Option<NodeId> {
    match plan(doc, path) {
        Route::Pagination(id) | Route::TagAlias(id) | Route::TagList(id) | Route::Alias(id) => {
            Some(id)
        }
        Route::PassThrough | Route::Skip | Route::MissingLoop => None,
    }
}

/// Expand `page`, whose components and other directives are already
/// resolved in `doc`, into its output pages.
pub fn expand_page(
    page: &Page,
    doc: Document,
    ctx: RouteContext<'_>,
) -> Result<Vec<Page>, RoutingError> {
    let route = plan(&doc, &page.path);
    if !matches!(route, Route::PassThrough | Route::MissingLoop) {
        let current = page.derive(page.path.clone(), doc.to_html());
        if let Some(pages) = ctx.hooks.run_routing(&current) {
            debug!(page = %page.path, count = pages.len(), "routed by plugin");
            return Ok(pages);
        }
    }

    match route {
        Route::PassThrough => Ok(vec![page.derive(page.path.clone(), doc.to_html())]),
        Route::Skip => {
            debug!(page = %page.path, "no cms-item to route, page skipped");
            Ok(Vec::new())
        }
        Route::MissingLoop => Err(RoutingError::MissingLoop {
            path: page.path.clone(),
        }),
        Route::Pagination(id) => pagination_pages(page, doc, id, ctx),
        Route::TagAlias(id) => tag_alias_pages(page, doc, id, ctx),
        Route::TagList(id) => tag_list_pages(page, doc, id, ctx),
        Route::Alias(id) => alias_pages(page, doc, id, ctx),
    }
}

// ============================================================================
// Expansion per route
// ============================================================================

fn pagination_pages(
    page: &Page,
    mut doc: Document,
    id: NodeId,
    ctx: RouteContext<'_>,
) -> Result<Vec<Page>, RoutingError> {
    let content_type = required_attr(&doc, id, "cms-loop", "cms-content-type")?;
    let size = doc
        .attr(id, "cms-pagination-size")
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let loop_id = doc.attr(id, "cms-loop-id").map(str::to_string);
    let tag_field = if doc.has_attr(id, "cms-tag-loop") {
        Some(required_attr(&doc, id, "cms-loop", "cms-tag-loop")?)
    } else {
        None
    };
    let prefix = item_variable(&doc, id, &content_type);
    let mut options = query_options(&mut doc, id).map_err(DirectiveError::from)?;
    options.limit = Some(ctx.max_pagination_count);
    prepare_template(&mut doc, id, &content_type, ctx.expand.options);
    let template = doc.outer_html(id);
    let list = ctx
        .expand
        .source
        .get_list(&content_type, &options)
        .map_err(DirectiveError::from)?;

    let groups: Vec<(String, Vec<String>)> = match &tag_field {
        Some(field) => group_by_tag(&list.data, field)
            .into_iter()
            .map(|(tag, records)| -> Result<(String, Vec<String>), DirectiveError> {
                let fragments = records
                    .into_iter()
                    .map(|r| render_tagged(&template, r, &prefix, &content_type, &tag, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((page.path.replace(TAG, &tag), fragments))
            })
            .collect::<Result<_, _>>()?,
        None => {
            let fragments = list
                .data
                .iter()
                .map(|r| render_record(&template, r, &prefix, &content_type, true, ctx.expand))
                .collect::<Result<Vec<_>, _>>()?;
            vec![(page.path.clone(), fragments)]
        }
    };

    let mut pages = Vec::new();
    for (path, fragments) in groups {
        let buckets = paginate(&fragments, size, ctx.boundary);
        for bucket in &buckets {
            let mut bucket_doc = doc.clone();
            bucket_doc.replace_with_html(id, &bucket.html);
            let markup = paginated_markup(&path, bucket_doc, loop_id.as_deref(), bucket, &buckets, ctx.hooks);
            pages.push(page.derive(path.replace(PAGINATION, &bucket.page.to_string()), markup));
        }
    }
    debug!(page = %page.path, count = pages.len(), "paginated");
    Ok(pages)
}

/// Final markup of one pagination page: a pagination hook's output, or the
/// page with its navigation tokens filled in.
fn paginated_markup(
    path: &str,
    mut doc: Document,
    loop_id: Option<&str>,
    bucket: &Bucket,
    buckets: &[Bucket],
    hooks: &HookRegistry,
) -> String {
    let markup = doc.to_html();
    let request = PaginationRequest {
        path,
        markup: &markup,
        loop_id,
        bucket,
        buckets,
    };
    if let Some(html) = hooks.run_pagination(&request) {
        return html;
    }

    let Some(nav) = doc.find_with_attrs(Document::ROOT, &["cms-pagination"]) else {
        return markup;
    };
    if doc.attr(nav, "cms-loop-id") != loop_id || doc.children(nav).is_empty() {
        return markup;
    }
    let html = replace_nav_tokens(&doc.outer_html(nav), path, bucket.page, buckets.len());
    for node in doc.replace_with_html(nav, &html) {
        if doc.is_element(node) {
            strip_cms_attributes(&mut doc, node);
        }
    }
    doc.to_html()
}

fn alias_pages(
    page: &Page,
    mut doc: Document,
    id: NodeId,
    ctx: RouteContext<'_>,
) -> Result<Vec<Page>, RoutingError> {
    let content_type = required_attr(&doc, id, "cms-item", "cms-content-type")?;
    let options = query_options(&mut doc, id).map_err(DirectiveError::from)?;
    strip_cms_attributes(&mut doc, id);
    let template = doc.inner_html(id);
    let list = ctx
        .expand
        .source
        .get_list(&content_type, &options)
        .map_err(DirectiveError::from)?;

    let pages = list
        .data
        .iter()
        .map(|record| -> Result<Page, DirectiveError> {
            let html = render_record(&template, record, &content_type, &content_type, true, ctx.expand)?;
            let markup = fill(&doc, id, &html, &content_type, Some(record.route_alias()), ctx);
            Ok(page.derive(page.path.replace(ALIAS, record.route_alias()), markup))
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(page = %page.path, count = pages.len(), "alias pages");
    Ok(pages)
}

fn tag_alias_pages(
    page: &Page,
    mut doc: Document,
    id: NodeId,
    ctx: RouteContext<'_>,
) -> Result<Vec<Page>, RoutingError> {
    let content_type = required_attr(&doc, id, "cms-item", "cms-content-type")?;
    let field = required_attr(&doc, id, "cms-item", "cms-tag-loop")?;
    if !page.path.contains(ALIAS) {
        return Err(RoutingError::TagLoopWithoutAlias {
            path: page.path.clone(),
        });
    }
    let options = query_options(&mut doc, id).map_err(DirectiveError::from)?;
    strip_cms_attributes(&mut doc, id);
    let template = doc.inner_html(id);
    let list = ctx
        .expand
        .source
        .get_list(&content_type, &options)
        .map_err(DirectiveError::from)?;

    let mut pages = Vec::new();
    for record in &list.data {
        let alias = record.route_alias();
        let html = render_record(&template, record, &content_type, &content_type, true, ctx.expand)?;
        let markup = fill(&doc, id, &html, &content_type, Some(alias), ctx);
        let tags = record.tags(&field);
        if tags.is_empty() {
            pages.push(page.derive(page.path.replace(ALIAS, alias), markup));
            continue;
        }
        let tag_token = token(&format!("{content_type}_#tag"));
        for tag in tags {
            pages.push(page.derive(
                page.path.replace(TAGS, &tag).replace(ALIAS, alias),
                markup.replace(&tag_token, &tag),
            ));
        }
    }
    debug!(page = %page.path, count = pages.len(), "tag and alias pages");
    Ok(pages)
}

fn tag_list_pages(
    page: &Page,
    mut doc: Document,
    id: NodeId,
    ctx: RouteContext<'_>,
) -> Result<Vec<Page>, RoutingError> {
    let content_type = required_attr(&doc, id, "cms-loop", "cms-content-type")?;
    let field = required_attr(&doc, id, "cms-loop", "cms-tag-loop")?;
    let prefix = item_variable(&doc, id, &content_type);
    let options = query_options(&mut doc, id).map_err(DirectiveError::from)?;
    strip_cms_attributes(&mut doc, id);
    let template = doc.inner_html(id);
    let list = ctx
        .expand
        .source
        .get_list(&content_type, &options)
        .map_err(DirectiveError::from)?;

    let mut pages = Vec::new();
    for (tag, records) in group_by_tag(&list.data, &field) {
        let html = records
            .into_iter()
            .map(|r| render_tagged(&template, r, &prefix, &content_type, &tag, ctx))
            .collect::<Result<String, _>>()?;
        let markup = fill(&doc, id, &html, &content_type, None, ctx);
        pages.push(page.derive(page.path.replace(TAGS, &tag), markup));
    }
    debug!(page = %page.path, count = pages.len(), "tag pages");
    Ok(pages)
}

// ============================================================================
// Helpers
// ============================================================================

fn item_variable(doc: &Document, id: NodeId, content_type: &str) -> String {
    doc.attr(id, "cms-item-variable")
        .filter(|v| !v.is_empty())
        .unwrap_or(content_type)
        .to_string()
}

/// Render one record of a tag group, resolving `{%= type_#tag %}`.
fn render_tagged(
    template: &str,
    record: &Record,
    prefix: &str,
    content_type: &str,
    tag: &str,
    ctx: RouteContext<'_>,
) -> Result<String, DirectiveError> {
    let html = render_record(template, record, prefix, content_type, true, ctx.expand)?;
    Ok(html.replace(&token(&format!("{content_type}_#tag")), tag))
}

/// Distinct tags in first-seen order, each with the records carrying it.
fn group_by_tag<'r>(records: &'r [Record], field: &str) -> Vec<(String, Vec<&'r Record>)> {
    let mut groups: Vec<(String, Vec<&'r Record>)> = Vec::new();
    for record in records {
        for tag in record.tags(field) {
            match groups.iter_mut().find(|(t, _)| *t == tag) {
                Some((_, members)) => {
                    if !members.iter().any(|m| std::ptr::eq(*m, record)) {
                        members.push(record);
                    }
                }
                None => groups.push((tag, vec![record])),
            }
        }
    }
    groups
}

/// The page markup with `html` as the content of the routed element.
fn fill(
    doc: &Document,
    id: NodeId,
    html: &str,
    content_type: &str,
    alias: Option<&str>,
    ctx: RouteContext<'_>,
) -> String {
    let mut doc = doc.clone();
    doc.set_inner_html(id, html);
    if ctx.expand.options.debug {
        doc.set_attr(id, "data-spear-content-type", content_type);
        if let Some(alias) = alias {
            doc.set_attr(id, "data-spear-content", alias);
        }
    }
    doc.to_html()
}
