//! Shared test utilities for the spear test suite.
//!
//! Provides content sources with known records, lookup helpers that panic
//! with a clear message on miss, and an on-disk copy of the fixture project.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let pages = expand_page(&page, doc, ctx).unwrap();
//! assert_eq!(page_paths(&pages), vec!["/blog/abc", "/blog/second", "/blog/third"]);
//! let page = find_page(&pages, "/blog/abc");
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::content::{FieldValue, Record, StaticSource};
use crate::types::Page;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// Content sources
// =========================================================================

/// Three `blog` records, in this order:
///
/// | alias | title | published | tags | author |
/// |-------|-------|-----------|------|--------|
/// | abc | Hello | 2023-01-01 | rust, web | Ann, Bob |
/// | second | Second | 2023-02-01 | rust | |
/// | third | Third | 2023-03-01 | go | |
pub fn blog_source() -> StaticSource {
    let author = |name: &str| {
        Record::new("author", &name.to_lowercase()).with_field("name", FieldValue::text(name))
    };
    StaticSource::new().with([
        Record::new("blog", "abc")
            .published("2023-01-01 09:00:00")
            .with_field("title", FieldValue::text("Hello"))
            .with_field(
                "author",
                FieldValue::ContentType(Some(vec![author("Ann"), author("Bob")])),
            )
            .with_field("tags", FieldValue::tags(&["rust", "web"])),
        Record::new("blog", "second")
            .published("2023-02-01 09:00:00")
            .with_field("title", FieldValue::text("Second"))
            .with_field("tags", FieldValue::tags(&["rust"])),
        Record::new("blog", "third")
            .published("2023-03-01 09:00:00")
            .with_field("title", FieldValue::text("Third"))
            .with_field("tags", FieldValue::tags(&["go"])),
    ])
}

/// `count` records of `content_type` with aliases `{type}-1`… and titles
/// `{type} 1`…, in ascending order.
pub fn numbered_source(content_type: &str, count: usize) -> StaticSource {
    StaticSource::new().with((1..=count).map(|i| {
        Record::new(content_type, &format!("{content_type}-{i}"))
            .with_field("title", FieldValue::text(&format!("{content_type} {i}")))
    }))
}

// =========================================================================
// Page lookups (panic with a clear message on miss)
// =========================================================================

/// Find a page by logical path. Panics if not found.
pub fn find_page<'a>(pages: &'a [Page], path: &str) -> &'a Page {
    pages.iter().find(|p| p.path == path).unwrap_or_else(|| {
        let paths = page_paths(pages);
        panic!("page '{path}' not found. Available: {paths:?}")
    })
}

/// All page paths in order.
pub fn page_paths(pages: &[Page]) -> Vec<&str> {
    pages.iter().map(|p| p.path.as_str()).collect()
}
