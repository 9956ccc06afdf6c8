//! End-to-end builds of the fixture project in `fixtures/site/`.
//!
//! Each test copies the fixture to a temp directory, builds it with the local
//! filesystem and fixture content source, and inspects the written files.

use spear::config::load_config;
use spear::fs::{Filesystem, LocalFs};
use spear::hooks::HookRegistry;
use spear::pipeline::{BuildError, BuildReport, CancellationToken, Project, Unit, build};
use spear::plugins;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> TempDir {
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

fn project(root: &Path) -> Project {
    let fs: Arc<dyn Filesystem> = Arc::new(LocalFs);
    let config = load_config(fs.as_ref(), root).unwrap();
    Project::new(root, fs, config)
}

fn build_with_plugins(root: &Path) -> BuildReport {
    let project = project(root);
    let mut hooks = HookRegistry::new();
    plugins::register_builtin(&mut hooks, &project.config.plugins);
    build(&project, &hooks, &CancellationToken::new()).unwrap()
}

fn read(root: &Path, file: &str) -> String {
    std::fs::read_to_string(root.join("dist").join(file))
        .unwrap_or_else(|e| panic!("cannot read dist/{file}: {e}"))
}

// =========================================================================
// Fixture site
// =========================================================================

#[test]
fn index_resolves_component_inside_item() {
    let tmp = setup();
    let report = build_with_plugins(tmp.path());
    assert!(report.is_success(), "{:?}", report.failures);

    let index = read(tmp.path(), "index.html");
    assert!(index.contains("<h1>Hello</h1>"), "{index}");
    assert!(index.contains("<footer class=\"site-footer\">Fixture</footer>"));
    assert!(!index.contains("cms-"));
    assert!(!index.contains("{%="));
}

#[test]
fn alias_template_fans_out_per_record() {
    let tmp = setup();
    build_with_plugins(tmp.path());
    for (alias, title) in [("abc", "Hello"), ("second", "Second"), ("third", "Third")] {
        let page = read(tmp.path(), &format!("blog/{alias}.html"));
        assert!(page.contains(&format!("<h1>{title}</h1>")), "{page}");
        assert!(page.contains("href=\"../css.css\""));
    }
    assert!(!tmp.path().join("dist/blog/[alias].html").exists());
}

#[test]
fn pagination_splits_news_into_three_pages() {
    let tmp = setup();
    build_with_plugins(tmp.path());
    let first = read(tmp.path(), "news/1.html");
    assert_eq!(first.matches("<li>").count(), 10);
    assert!(first.contains("<span>1 of 3</span>"));
    assert!(first.contains("href=\"/news/2.html\""));

    let last = read(tmp.path(), "news/3.html");
    assert_eq!(last.matches("<li>").count(), 5);
    assert!(last.contains("<li>News 25</li>"));
    assert!(last.contains("<span>3 of 3</span>"));
    assert!(!tmp.path().join("dist/news/4.html").exists());
}

#[test]
fn tag_pages_group_records() {
    let tmp = setup();
    build_with_plugins(tmp.path());
    let rust = read(tmp.path(), "tags/rust.html");
    assert!(rust.contains("<li>Hello</li>"));
    assert!(rust.contains("<li>Second</li>"));
    assert!(!rust.contains("<li>Third</li>"));
    assert!(read(tmp.path(), "tags/go.html").contains("<li>Third</li>"));
    assert!(tmp.path().join("dist/tags/web.html").exists());
}

#[test]
fn bundles_assets_and_sitemap_are_written() {
    let tmp = setup();
    build_with_plugins(tmp.path());
    assert!(read(tmp.path(), "css.css").contains(".site-footer"));
    assert!(read(tmp.path(), "style.css").contains("margin: 0"));
    assert!(tmp.path().join("dist/images/logo.svg").exists());
    assert!(!tmp.path().join("dist/components").exists());

    let sitemap = read(tmp.path(), "sitemap.xml");
    assert!(sitemap.contains("<loc>https://blog.example.com/index.html</loc>"));
    assert!(sitemap.contains("<loc>https://blog.example.com/news/2.html</loc>"));
}

// =========================================================================
// Failures and cancellation
// =========================================================================

#[test]
fn broken_page_is_reported_and_others_build() {
    let tmp = setup();
    std::fs::write(
        tmp.path().join("src/broken.html"),
        "<ul><li cms-loop>{%= blog_title %}</li></ul>",
    )
    .unwrap();
    let report = build_with_plugins(tmp.path());

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.unit, Unit::Page);
    assert_eq!(failure.path, "/broken");
    assert!(failure.message.contains("cms-content-type"));
    assert!(!tmp.path().join("dist/broken.html").exists());
    assert!(tmp.path().join("dist/index.html").exists());
}

#[test]
fn cancelled_build_writes_nothing() {
    let tmp = setup();
    let project = project(tmp.path());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = build(&project, &HookRegistry::new(), &cancel);
    assert!(matches!(result, Err(BuildError::Cancelled)));
    assert!(!tmp.path().join("dist/index.html").exists());
}

// =========================================================================
// Plugins
// =========================================================================

#[test]
fn seo_plugin_fills_head() {
    let tmp = setup();
    std::fs::write(tmp.path().join("seo.yaml"), "site: Fixture Blog\n").unwrap();
    let mut toml = std::fs::read_to_string(tmp.path().join("spear.toml")).unwrap();
    toml.push_str("\n[plugins]\nseo = \"seo.yaml\"\n");
    std::fs::write(tmp.path().join("spear.toml"), toml).unwrap();
    std::fs::write(
        tmp.path().join("src/about.html"),
        "<spear-seo meta-description=\"About {%= #seo_site %}\"></spear-seo><p>About</p>",
    )
    .unwrap();

    let report = build_with_plugins(tmp.path());
    assert!(report.is_success(), "{:?}", report.failures);
    let about = read(tmp.path(), "about.html");
    assert!(about.contains("<meta name=\"description\" content=\"About Fixture Blog\">"));
    assert!(!about.contains("spear-seo"));
}
