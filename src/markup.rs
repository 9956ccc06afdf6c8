//! Lenient HTML parsing and serialization.
//!
//! Templates are HTML-like files full of custom tags (`<blog-title>`,
//! `<slot>`, `<spear-seo>`) and `{%= … %}` tokens, so a standards-conforming HTML5
//! parser is the wrong tool: it would hoist unknown elements, re-nest tables
//! and rewrite attribute quoting. This module parses exactly what is written
//! and serializes it back the same way.
//!
//! ## Arena
//!
//! A [`Document`] owns every node in a flat `Vec`. Nodes refer to their
//! parent and children by [`NodeId`]; the parent link exists for depth and
//! ancestor queries only. Index `0` is always the fragment root.
//!
//! ```text
//! Document.nodes
//! ├── 0  Fragment           children: [1, 3]
//! ├── 1  Element <div>      parent: 0, children: [2]
//! ├── 2  Text "hello"       parent: 1
//! └── 3  Element <br>       parent: 0
//! ```
//!
//! Detached nodes stay in the arena but are unreachable from the root.
//! Splicing content from another document deep-copies it, so two documents
//! never share nodes.
//!
//! ## Parsing rules
//!
//! - Tag and attribute names keep their original case; lookups are
//!   case-insensitive.
//! - Attribute values keep their quote style (`"`, `'`, or none).
//! - `script`, `style`, `textarea` and `title` hold raw text until their end tag.
//! - Void elements (`br`, `img`, `meta`, …) never take children; `<x/>` closes `x`.
//! - An end tag closes the nearest open element with the same name; stray end
//!   tags are dropped. Elements still open at the end of input are closed.
//! - Text, comments and doctypes are stored verbatim (entities untouched).

/// Index of a node inside its [`Document`].
pub type NodeId = usize;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

const WHITESPACE_SENSITIVE: &[&str] = &["pre", "textarea", "script", "style"];

/// How an attribute value was quoted in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
    Unquoted,
}

/// A single attribute. `value` is `None` for boolean attributes (`cms-loop`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Fragment,
    Element(Element),
    Text(String),
    /// Full source text including `<!--` and `-->`.
    Comment(String),
    /// Full source text of `<!DOCTYPE …>` or any other `<!…>` / `<?…>` construct.
    Doctype(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed markup tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// The fragment root of every document.
    pub const ROOT: NodeId = 0;

    /// An empty document containing only the fragment root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Fragment,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse markup into a new document. Never fails; malformed input is
    /// recovered from as described in the module docs.
    pub fn parse(input: &str) -> Self {
        Parser::new(input).run()
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Element(_))
    }

    /// Tag name as written in the source, for element nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element(el) => Some(el.tag.as_str()),
            _ => None,
        }
    }

    /// Case-insensitive tag comparison. `false` for non-elements.
    pub fn has_tag(&self, id: NodeId, name: &str) -> bool {
        self.tag(id).is_some_and(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.nodes[id].kind {
            NodeKind::Element(el) => &el.attrs,
            _ => &[],
        }
    }

    /// Attribute value. Boolean attributes read as `Some("")`.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attributes(id)
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Number of ancestors between the node and the fragment root.
    /// Top-level nodes have depth 1.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[id].parent;
        while let Some(p) = current {
            depth += 1;
            current = self.nodes[p].parent;
        }
        depth
    }

    /// Whether the node is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == Self::ROOT {
                return true;
            }
            match self.nodes[current].parent {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    pub fn has_ancestor(&self, id: NodeId, tag: &str) -> bool {
        let mut current = self.nodes[id].parent;
        while let Some(p) = current {
            if self.has_tag(p, tag) {
                return true;
            }
            current = self.nodes[p].parent;
        }
        false
    }

    /// All descendants of `id` in document (pre-)order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    /// First descendant element of `id` matching `pred`, in document order.
    pub fn find_first<F>(&self, id: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.descendants(id)
            .into_iter()
            .find(|&n| self.is_element(n) && pred(self, n))
    }

    /// Every descendant element of `id` matching `pred`, in document order.
    pub fn find_all<F>(&self, id: NodeId, pred: F) -> Vec<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_element(n) && pred(self, n))
            .collect()
    }

    /// First element carrying every attribute in `names`.
    pub fn find_with_attrs(&self, id: NodeId, names: &[&str]) -> Option<NodeId> {
        self.find_first(id, |doc, n| names.iter().all(|a| doc.has_attr(n, a)))
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in &self.nodes[id].children {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        self.inner_html(Self::ROOT)
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Fragment => {
                for &child in &self.nodes[id].children {
                    self.write_node(child, out);
                }
            }
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(raw) | NodeKind::Doctype(raw) => out.push_str(raw),
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for attr in &el.attrs {
                    out.push(' ');
                    write_attribute(attr, out);
                }
                out.push('>');
                if is_void(&el.tag) {
                    return;
                }
                for &child in &self.nodes[id].children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Set (or overwrite) an attribute, keeping its position if it exists.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element(el) = &mut self.nodes[id].kind {
            let quote = if value.contains('"') {
                Quote::Single
            } else {
                Quote::Double
            };
            match el.attrs.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
                Some(existing) => {
                    existing.value = Some(value.to_string());
                    if existing.quote == Quote::Unquoted || value.contains('"') {
                        existing.quote = quote;
                    }
                }
                None => el.attrs.push(Attribute {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                    quote,
                }),
            }
        }
    }

    /// Remove an attribute. Removing an absent attribute is a no-op.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        let mut removed = false;
        if let NodeKind::Element(el) = &mut self.nodes[id].kind {
            el.attrs.retain(|a| {
                let hit = a.name.eq_ignore_ascii_case(name);
                removed |= hit;
                !hit
            });
        }
        removed
    }

    /// Keep only the attributes for which `keep` returns true.
    pub fn retain_attrs<F>(&mut self, id: NodeId, mut keep: F)
    where
        F: FnMut(&Attribute) -> bool,
    {
        if let NodeKind::Element(el) = &mut self.nodes[id].kind {
            el.attrs.retain(|a| keep(a));
        }
    }

    pub fn rename(&mut self, id: NodeId, tag: &str) {
        if let NodeKind::Element(el) = &mut self.nodes[id].kind {
            el.tag = tag.to_string();
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let NodeKind::Text(t) = &mut self.nodes[id].kind {
            *t = text.to_string();
        }
    }

    /// Remove a node from its parent. The node's own subtree is left intact.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    /// Replace `id` with the top-level nodes of `other`, deep-copied.
    /// Returns the ids of the inserted nodes.
    pub fn replace_with_document(&mut self, id: NodeId, other: &Document) -> Vec<NodeId> {
        let imported: Vec<NodeId> = other.nodes[Self::ROOT]
            .children
            .iter()
            .map(|&child| self.import(other, child))
            .collect();
        self.replace_with_nodes(id, imported.clone());
        imported
    }

    /// Replace `id` with the nodes parsed from `html`.
    pub fn replace_with_html(&mut self, id: NodeId, html: &str) -> Vec<NodeId> {
        let fragment = Document::parse(html);
        self.replace_with_document(id, &fragment)
    }

    /// Replace a node with its own children.
    pub fn unwrap(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id].children);
        self.replace_with_nodes(id, children);
    }

    /// Replace the children of `id` with the nodes parsed from `html`.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) {
        for child in std::mem::take(&mut self.nodes[id].children) {
            self.nodes[child].parent = None;
        }
        self.append_html(id, html);
    }

    /// Parse `html` and append its nodes as the last children of `parent`.
    pub fn append_html(&mut self, parent: NodeId, html: &str) {
        let fragment = Document::parse(html);
        for &child in &fragment.nodes[Self::ROOT].children {
            let imported = self.import(&fragment, child);
            self.nodes[imported].parent = Some(parent);
            self.nodes[parent].children.push(imported);
        }
    }

    /// Deep-copy the subtree rooted at `other_id` into this arena.
    /// The returned node is detached; the caller links it.
    pub fn import(&mut self, other: &Document, other_id: NodeId) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: other.nodes[other_id].kind.clone(),
            parent: None,
            children: Vec::new(),
        });
        for &child in &other.nodes[other_id].children {
            let copied = self.import(other, child);
            self.nodes[copied].parent = Some(id);
            self.nodes[id].children.push(copied);
        }
        id
    }

    fn replace_with_nodes(&mut self, id: NodeId, replacement: Vec<NodeId>) {
        let Some(parent) = self.nodes[id].parent else {
            return;
        };
        let Some(index) = self.nodes[parent].children.iter().position(|&c| c == id) else {
            return;
        };
        for &node in &replacement {
            self.nodes[node].parent = Some(parent);
        }
        self.nodes[parent]
            .children
            .splice(index..=index, replacement);
        self.nodes[id].parent = None;
    }

    fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }
}

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

fn write_attribute(attr: &Attribute, out: &mut String) {
    out.push_str(&attr.name);
    let Some(value) = &attr.value else {
        return;
    };
    out.push('=');
    let quote = match attr.quote {
        Quote::Unquoted
            if !value.is_empty()
                && !value
                    .chars()
                    .any(|c| c.is_ascii_whitespace() || matches!(c, '"' | '\'' | '>' | '=')) =>
        {
            None
        }
        Quote::Single => Some('\''),
        _ if value.contains('"') => Some('\''),
        _ => Some('"'),
    };
    match quote {
        Some(q) => {
            out.push(q);
            out.push_str(value);
            out.push(q);
        }
        None => out.push_str(value),
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    text_start: usize,
    doc: Document,
    open: Vec<NodeId>,
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            text_start: 0,
            doc: Document::new(),
            open: vec![Document::ROOT],
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(Document::ROOT)
    }

    fn run(mut self) -> Document {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            if bytes[self.pos] != b'<' {
                self.pos += 1;
                continue;
            }
            let rest = &self.input[self.pos..];
            if rest.starts_with("<!--") {
                let end = rest
                    .find("-->")
                    .map(|i| self.pos + i + 3)
                    .unwrap_or(self.input.len());
                self.emit_raw(end, true);
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest
                    .find('>')
                    .map(|i| self.pos + i + 1)
                    .unwrap_or(self.input.len());
                self.emit_raw(end, false);
            } else if rest.starts_with("</") {
                self.end_tag();
            } else if bytes.get(self.pos + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
                self.start_tag();
            } else {
                self.pos += 1;
            }
        }
        self.flush_text(self.input.len());
        self.doc
    }

    fn flush_text(&mut self, until: usize) {
        if self.text_start < until {
            let text = self.input[self.text_start..until].to_string();
            let parent = self.current();
            self.doc.append(parent, NodeKind::Text(text));
        }
    }

    fn emit_raw(&mut self, end: usize, comment: bool) {
        self.flush_text(self.pos);
        let raw = self.input[self.pos..end].to_string();
        let parent = self.current();
        let kind = if comment {
            NodeKind::Comment(raw)
        } else {
            NodeKind::Doctype(raw)
        };
        self.doc.append(parent, kind);
        self.pos = end;
        self.text_start = end;
    }

    fn end_tag(&mut self) {
        let bytes = self.input.as_bytes();
        let name_start = self.pos + 2;
        let mut i = name_start;
        while i < bytes.len() && is_name_char(bytes[i]) {
            i += 1;
        }
        if i == name_start {
            // `</` followed by something that is not a name: plain text.
            self.pos += 1;
            return;
        }
        let name = &self.input[name_start..i];
        let end = self.input[i..]
            .find('>')
            .map(|j| i + j + 1)
            .unwrap_or(self.input.len());
        self.flush_text(self.pos);
        if let Some(index) = self
            .open
            .iter()
            .rposition(|&n| n != Document::ROOT && self.doc.has_tag(n, name))
        {
            self.open.truncate(index);
        }
        self.pos = end;
        self.text_start = end;
    }

    fn start_tag(&mut self) {
        let bytes = self.input.as_bytes();
        let name_start = self.pos + 1;
        let mut i = name_start;
        while i < bytes.len() && is_name_char(bytes[i]) {
            i += 1;
        }
        let tag = self.input[name_start..i].to_string();
        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' if bytes.get(i + 1) == Some(&b'>') => {
                    self_closing = true;
                    i += 2;
                    break;
                }
                b'/' | b'"' | b'\'' | b'=' => {
                    i += 1;
                    continue;
                }
                _ => {}
            }
            let attr_start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>')
                && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
            {
                i += 1;
            }
            let name = self.input[attr_start..i].to_string();
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'=' {
                j += 1;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                let (value, quote, next) = self.attribute_value(j);
                attrs.push(Attribute {
                    name,
                    value: Some(value),
                    quote,
                });
                i = next;
            } else {
                attrs.push(Attribute {
                    name,
                    value: None,
                    quote: Quote::Double,
                });
            }
        }

        self.flush_text(self.pos);
        self.close_implied(&tag);
        let parent = self.current();
        let id = self.doc.append(
            parent,
            NodeKind::Element(Element {
                tag: tag.clone(),
                attrs,
            }),
        );
        self.pos = i;
        self.text_start = i;

        if self_closing || is_void(&tag) {
            return;
        }
        if RAW_TEXT_ELEMENTS.iter().any(|r| r.eq_ignore_ascii_case(&tag)) {
            self.raw_text(id, &tag);
            return;
        }
        self.open.push(id);
    }

    fn attribute_value(&self, start: usize) -> (String, Quote, usize) {
        let bytes = self.input.as_bytes();
        match bytes.get(start) {
            Some(&q @ (b'"' | b'\'')) => {
                let quote = if q == b'"' { Quote::Double } else { Quote::Single };
                let body = start + 1;
                match self.input[body..].find(q as char) {
                    Some(len) => (
                        self.input[body..body + len].to_string(),
                        quote,
                        body + len + 1,
                    ),
                    None => (self.input[body..].to_string(), quote, self.input.len()),
                }
            }
            _ => {
                let mut end = start;
                while end < bytes.len() && !bytes[end].is_ascii_whitespace() && bytes[end] != b'>'
                {
                    end += 1;
                }
                (
                    self.input[start..end].to_string(),
                    Quote::Unquoted,
                    end,
                )
            }
        }
    }

    /// Consume everything up to the matching end tag as a single text child.
    fn raw_text(&mut self, id: NodeId, tag: &str) {
        let rest = &self.input[self.pos..];
        let needle = format!("</{}", tag.to_ascii_lowercase());
        let close = rest.to_ascii_lowercase().find(&needle);
        let (content_end, after) = match close {
            Some(offset) => {
                let close_start = self.pos + offset;
                let after = self.input[close_start..]
                    .find('>')
                    .map(|j| close_start + j + 1)
                    .unwrap_or(self.input.len());
                (close_start, after)
            }
            None => (self.input.len(), self.input.len()),
        };
        if content_end > self.pos {
            let text = self.input[self.pos..content_end].to_string();
            self.doc.append(id, NodeKind::Text(text));
        }
        self.pos = after;
        self.text_start = after;
    }

    /// `<li>` and `<p>` and `<option>` implicitly close an open sibling of the same kind.
    fn close_implied(&mut self, tag: &str) {
        const SELF_CLOSING_SIBLINGS: &[&str] = &["li", "p", "option"];
        if !SELF_CLOSING_SIBLINGS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(tag))
        {
            return;
        }
        let current = self.current();
        if current != Document::ROOT && self.doc.has_tag(current, tag) {
            self.open.pop();
        }
    }
}

// ============================================================================
// Whitespace collapsing
// ============================================================================

/// Collapse insignificant whitespace in markup.
///
/// Runs of whitespace inside text become a single space, text at the edges
/// of its parent is trimmed, and whitespace-only text between siblings
/// becomes a single space. Content of `pre`, `textarea`, `script` and
/// `style` is left alone.
pub fn minify(input: &str) -> String {
    let mut doc = Document::parse(input);
    let texts: Vec<NodeId> = doc
        .descendants(Document::ROOT)
        .into_iter()
        .filter(|&id| matches!(doc.kind(id), NodeKind::Text(_)))
        .collect();

    for id in texts {
        let parent = doc.parent(id).unwrap_or(Document::ROOT);
        if WHITESPACE_SENSITIVE
            .iter()
            .any(|tag| doc.has_tag(parent, tag) || doc.has_ancestor(id, tag))
        {
            continue;
        }
        let NodeKind::Text(text) = doc.kind(id) else {
            continue;
        };
        let mut collapsed = collapse_runs(text);
        let siblings = doc.children(parent);
        let first = siblings.first() == Some(&id);
        let last = siblings.last() == Some(&id);
        if first || parent == Document::ROOT {
            collapsed = collapsed.trim_start().to_string();
        }
        if last || parent == Document::ROOT {
            collapsed = collapsed.trim_end().to_string();
        }
        if collapsed.is_empty() {
            doc.detach(id);
        } else {
            doc.set_text(id, &collapsed);
        }
    }
    doc.to_html()
}

fn collapse_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
