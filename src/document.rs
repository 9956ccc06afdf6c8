//! Final document assembly.
//!
//! Pages are usually fragments. Before writing, a fragment is wrapped in a
//! minimal HTML shell, the bundled stylesheet and script are linked from
//! `<head>`, and `{{projectName}}` in the head is filled in.

use maud::{DOCTYPE, Markup, PreEscaped, html};

use crate::markup::Document;

/// Placeholder for the configured project name, only replaced in `<head>`.
pub const PROJECT_NAME_TOKEN: &str = "{{projectName}}";

pub const CSS_FILE: &str = "css.css";
pub const SCRIPT_FILE: &str = "script.js";

/// Renders the base HTML document structure around `content`.
fn base_document(content: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (PROJECT_NAME_TOKEN) }
            }
            body {
                (PreEscaped(content))
            }
        }
    }
}

/// `markup` as a full document, wrapping it in the base shell when it has
/// no `</html>`.
pub fn ensure_document(markup: &str) -> String {
    if markup.contains("</html>") {
        markup.to_string()
    } else {
        base_document(markup).into_string()
    }
}

/// Prefix leading from a page at `path` back to the output root.
///
/// `/index` → `./`, `/blog/post` → `../`.
pub fn relative_root(path: &str) -> String {
    match path.trim_start_matches('/').matches('/').count() {
        0 => "./".to_string(),
        depth => "../".repeat(depth),
    }
}

/// Which bundles the build wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bundles {
    pub css: bool,
    pub script: bool,
}

/// The document written for the page at `path`.
pub fn assemble(path: &str, markup: &str, bundles: Bundles, project_name: &str) -> String {
    let mut doc = Document::parse(&ensure_document(markup));
    let Some(head) = doc.find_first(Document::ROOT, |d, n| d.has_tag(n, "head")) else {
        return doc.to_html();
    };

    let root = relative_root(path);
    if bundles.css {
        let link = html! { link rel="stylesheet" href={ (root) (CSS_FILE) }; };
        doc.append_html(head, &link.into_string());
    }
    if bundles.script {
        let script = html! { script src={ (root) (SCRIPT_FILE) } {} };
        doc.append_html(head, &script.into_string());
    }

    let head_html = doc.inner_html(head);
    if head_html.contains(PROJECT_NAME_TOKEN) {
        doc.set_inner_html(head, &head_html.replace(PROJECT_NAME_TOKEN, project_name));
    }
    doc.to_html()
}
