//! Built-in HTML element names.
//!
//! A component file named after one of these (`header.html`, `button.html`)
//! would shadow the real element everywhere it is used, so registration
//! rejects it.

const HTML_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "address", "applet", "area", "article", "aside", "audio", "b", "base",
    "basefont", "bdi", "bdo", "big", "blink", "blockquote", "body", "br", "button", "canvas",
    "caption", "center", "cite", "code", "col", "colgroup", "content", "data", "datalist", "dd",
    "del", "details", "dfn", "dialog", "dir", "div", "dl", "dt", "em", "embed", "fieldset",
    "figcaption", "figure", "font", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4",
    "h5", "h6", "head", "header", "hgroup", "hr", "html", "i", "iframe", "image", "img", "input",
    "ins", "kbd", "keygen", "label", "legend", "li", "link", "main", "map", "mark", "marquee",
    "math", "menu", "menuitem", "meta", "meter", "nav", "nobr", "noembed", "noframes", "noscript",
    "object", "ol", "optgroup", "option", "output", "p", "param", "picture", "plaintext",
    "portal", "pre", "progress", "q", "rb", "rp", "rt", "rtc", "ruby", "s", "samp", "script",
    "search", "section", "select", "shadow", "slot", "small", "source", "spacer", "span",
    "strike", "strong", "style", "sub", "summary", "sup", "svg", "table", "tbody", "td",
    "template", "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track", "tt", "u",
    "ul", "var", "video", "wbr", "xmp",
];

/// Whether `name` is a built-in HTML element (case-insensitive).
pub fn is_builtin_tag(name: &str) -> bool {
    HTML_TAGS.iter().any(|t| t.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_builtins_case_insensitively() {
        assert!(is_builtin_tag("div"));
        assert!(is_builtin_tag("Header"));
        assert!(is_builtin_tag("slot"));
    }

    #[test]
    fn custom_names_are_not_builtin() {
        assert!(!is_builtin_tag("blog-title"));
        assert!(!is_builtin_tag("card"));
        assert!(!is_builtin_tag("spear-seo"));
    }
}
