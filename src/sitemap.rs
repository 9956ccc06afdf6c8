//! Sitemap XML rendering.

use maud::{PreEscaped, html};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Render a sitemap listing every path under `base_url`. Each entry is
/// marked as changing daily with priority 0.7.
pub fn render(paths: &[String], base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let markup = html! {
        (PreEscaped(XML_DECLARATION))
        urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9" {
            @for path in paths {
                url {
                    loc { (base) (path) }
                    changefreq { "daily" }
                    priority { "0.7" }
                }
            }
        }
    };
    markup.into_string()
}
