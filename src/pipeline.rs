//! Build orchestration.
//!
//! One build runs these stages in order:
//!
//! ```text
//! configuration hooks
//! clean output dir
//! register components        components_dir/**/*.html → <tag>
//! discover pages and assets  pages_dir/** (minus components_dir)
//! before-build hooks
//! resolve component bodies   report broken components once
//! expand pages (parallel)    components → directives → routing
//! merge css / scripts        page order, exact duplicates dropped
//! after-build hooks
//! bundle hooks
//! write output               css.css, script.js, pages, sitemap.xml, assets
//! ```
//!
//! A broken component, page or stylesheet is recorded as a [`BuildFailure`]
//! and the build goes on without it. Only configuration errors, output
//! filesystem errors and cancellation abort the build. Cancellation is
//! checked before each page and again before anything is written, so a
//! cancelled build writes nothing.

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::components::{self, ComponentError, ComponentRegistry, Resolution};
use crate::config::{ConfigError, ContentConfig, ContentSourceKind, SiteConfig};
use crate::content::{ContentSource, FixtureSource, MarkdownSource};
use crate::directives::{self, DirectiveError, ExpandContext};
use crate::document::{self, Bundles, CSS_FILE, SCRIPT_FILE};
use crate::fs::{Filesystem, FsError};
use crate::hooks::{HookEnv, HookRegistry};
use crate::markup::{Document, minify};
use crate::naming::{self, SourceKind};
use crate::routing::{self, RouteContext, RoutingError};
use crate::types::{Asset, BuildState, Page};

pub const SITEMAP_FILE: &str = "sitemap.xml";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("build cancelled")]
    Cancelled,
}

/// What failed to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Component,
    Page,
    Stylesheet,
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Unit::Component => "component",
            Unit::Page => "page",
            Unit::Stylesheet => "stylesheet",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub unit: Unit,
    /// Source path relative to the project root, or the page's logical path.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Written page files, relative to the output dir, in write order.
    pub pages: Vec<String>,
    pub assets: usize,
    pub components: usize,
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Signals a running build to stop. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A project to build.
pub struct Project {
    pub root: PathBuf,
    pub fs: Arc<dyn Filesystem>,
    pub config: SiteConfig,
    /// Content for directives. When `None`, a local source is created from
    /// `config.content` after the configuration hooks ran.
    pub source: Option<Arc<dyn ContentSource>>,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn Filesystem>, config: SiteConfig) -> Self {
        Self {
            root: root.into(),
            fs,
            config,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.source = Some(source);
        self
    }
}

/// The local content source described by `content`.
pub fn content_source(
    fs: Arc<dyn Filesystem>,
    root: &Path,
    content: &ContentConfig,
) -> Arc<dyn ContentSource> {
    let data_dir = root.join(&content.data_dir);
    match content.source {
        ContentSourceKind::Fixture => Arc::new(FixtureSource::new(fs, data_dir)),
        ContentSourceKind::Markdown => {
            Arc::new(MarkdownSource::new(fs, data_dir, &content.markdown_extension))
        }
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Sources found on disk, before any expansion.
#[derive(Debug, Default)]
struct Discovery {
    registry: ComponentRegistry,
    pages: Vec<Page>,
    assets: Vec<Asset>,
    failures: Vec<BuildFailure>,
}

/// Every file below `dir`, depth first in name order, skipping `skip`.
fn walk_files(fs: &dyn Filesystem, dir: &Path, skip: &[PathBuf]) -> Result<Vec<PathBuf>, FsError> {
    let mut files = Vec::new();
    for path in fs.list(dir)? {
        if skip.iter().any(|s| s == &path) {
            continue;
        }
        if fs.is_dir(&path) {
            files.extend(walk_files(fs, &path, skip)?);
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

fn relative(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base).unwrap_or(path).to_path_buf()
}

fn discover(fs: &dyn Filesystem, root: &Path, config: &SiteConfig) -> Result<Discovery, FsError> {
    let mut found = Discovery::default();

    let components_dir = root.join(&config.components_dir);
    if fs.is_dir(&components_dir) {
        for path in walk_files(fs, &components_dir, &[])? {
            if naming::classify(&path) != SourceKind::Template {
                continue;
            }
            let file_name = naming::slash_path(&relative(&path, &components_dir));
            let source = fs.read_text(&path)?;
            if let Err(e) = found.registry.register(&file_name, &source) {
                found.failures.push(failure(Unit::Component, &file_name, e));
            }
        }
    }

    let pages_dir = root.join(&config.pages_dir);
    if !fs.is_dir(&pages_dir) {
        warn!(dir = %pages_dir.display(), "pages directory not found");
        return Ok(found);
    }
    let skip = [components_dir, root.join(&config.dist_dir)];
    for path in walk_files(fs, &pages_dir, &skip)? {
        let rel = relative(&path, &pages_dir);
        match naming::classify(&path) {
            SourceKind::Template => {
                let source = fs.read_text(&path)?;
                found.pages.push(Page::new(&naming::logical_path(&rel), &minify(&source)));
            }
            SourceKind::Stylesheet => match fs.compile_stylesheet(&path) {
                Ok(css) => found.assets.push(Asset {
                    path: naming::stylesheet_output(&rel),
                    bytes: css.into_bytes(),
                }),
                Err(e) => found
                    .failures
                    .push(failure(Unit::Stylesheet, &naming::slash_path(&rel), e)),
            },
            SourceKind::Asset => found.assets.push(Asset {
                path: naming::slash_path(&rel),
                bytes: fs.read_binary(&path)?,
            }),
        }
    }
    debug!(
        components = found.registry.len(),
        pages = found.pages.len(),
        assets = found.assets.len(),
        "discovered sources"
    );
    Ok(found)
}

fn failure(unit: Unit, path: &str, error: impl std::fmt::Display) -> BuildFailure {
    warn!(%unit, path, error = %error, "build unit failed");
    BuildFailure {
        unit,
        path: path.to_string(),
        message: error.to_string(),
    }
}

/// Register components and discover pages without expanding anything.
pub fn check(project: &Project) -> Result<BuildReport, BuildError> {
    let config = &project.config;
    config.validate()?;
    let mut found = discover(project.fs.as_ref(), &project.root, config)?;
    for component in found.registry.iter() {
        if let Err(e) = components::resolve_component(component, &found.registry) {
            found
                .failures
                .push(failure(Unit::Component, &component.file_name, e));
        }
    }
    Ok(BuildReport {
        pages: found.pages.iter().map(|p| naming::page_file(&p.path)).collect(),
        assets: found.assets.len(),
        components: found.registry.len(),
        failures: found.failures,
    })
}

// ============================================================================
// Expansion
// ============================================================================

#[derive(Error, Debug)]
enum PageError {
    #[error(transparent)]
    Component(#[from] ComponentError),
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("build cancelled")]
    Cancelled,
}

/// Expand one source page into its output pages.
fn expand_source_page(
    page: &Page,
    registry: &ComponentRegistry,
    ctx: RouteContext<'_>,
    cancel: &CancellationToken,
) -> Result<(Vec<Page>, Resolution), PageError> {
    if cancel.is_cancelled() {
        return Err(PageError::Cancelled);
    }
    let mut doc = Document::parse(&page.markup);
    let resolution = components::resolve(&mut doc, registry)?;
    let skip = routing::route_element(&doc, &page.path);
    directives::expand(&mut doc, skip, ctx.expand)?;

    let mut page = page.clone();
    page.props.extend(resolution.props.clone());
    let pages = routing::expand_page(&page, doc, ctx)?;
    debug!(page = %page.path, outputs = pages.len(), "expanded");
    Ok((pages, resolution))
}

/// Keep the first occurrence of every fragment.
fn dedup(fragments: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    fragments
        .into_iter()
        .filter(|f| seen.insert(f.clone()))
        .collect()
}

/// Run a full build.
pub fn build(
    project: &Project,
    hooks: &HookRegistry,
    cancel: &CancellationToken,
) -> Result<BuildReport, BuildError> {
    let fs = project.fs.as_ref();
    let root = project.root.as_path();
    let env = HookEnv { fs, root };

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }
    let config = hooks.run_config(project.config.clone(), env);
    config.validate()?;

    let dist = root.join(&config.dist_dir);
    fs.remove(&dist)?;

    let found = discover(fs, root, &config)?;
    let mut failures = found.failures;
    let state = hooks.run_before_build(BuildState {
        pages: found.pages,
        components: found.registry.iter().cloned().collect(),
        assets: found.assets,
        ..Default::default()
    });

    // Hooks may have changed the component set.
    let mut registry = ComponentRegistry::new();
    for component in &state.components {
        if let Err(e) = registry.register(&component.file_name, &component.raw_markup) {
            failures.push(failure(Unit::Component, &component.file_name, e));
        }
    }
    for component in registry.iter() {
        if let Err(e) = components::resolve_component(component, &registry) {
            failures.push(failure(Unit::Component, &component.file_name, e));
        }
    }
    debug!(components = registry.len(), "resolved component bodies");

    let source = match &project.source {
        Some(source) => source.clone(),
        None => content_source(project.fs.clone(), root, &config.content),
    };
    let options = config.render_options();
    let ctx = RouteContext {
        expand: ExpandContext {
            source: source.as_ref(),
            options: &options,
        },
        hooks,
        max_pagination_count: config.max_pagination_count,
        boundary: config.pagination_boundary,
    };

    let results: Vec<_> = state
        .pages
        .par_iter()
        .map(|page| (page, expand_source_page(page, &registry, ctx, cancel)))
        .collect();
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    let mut pages = Vec::new();
    let mut resolution = Resolution::default();
    for (page, result) in results {
        match result {
            Ok((expanded, found)) => {
                pages.extend(expanded);
                resolution.merge(found);
            }
            Err(e) => failures.push(failure(Unit::Page, &page.path, e)),
        }
    }

    let mut global_props = state.global_props.clone();
    global_props.extend(resolution.global_props);
    let state = hooks.run_after_build(BuildState {
        pages,
        css: dedup(state.css.iter().cloned().chain(resolution.css).collect()),
        scripts: dedup(state.scripts.iter().cloned().chain(resolution.scripts).collect()),
        global_props,
        ..state
    });
    let state = hooks.run_bundle(state);

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }
    let report = write_output(fs, &dist, &config, &state)?;
    Ok(BuildReport {
        failures,
        components: registry.len(),
        ..report
    })
}

// ============================================================================
// Output
// ============================================================================

fn write_output(
    fs: &dyn Filesystem,
    dist: &Path,
    config: &SiteConfig,
    state: &BuildState,
) -> Result<BuildReport, FsError> {
    let bundles = Bundles {
        css: !state.css.is_empty(),
        script: !state.scripts.is_empty(),
    };
    if bundles.css {
        fs.write(&dist.join(CSS_FILE), state.css.join("\n").as_bytes())?;
    }
    if bundles.script {
        fs.write(&dist.join(SCRIPT_FILE), state.scripts.join("\n").as_bytes())?;
    }

    let mut written = HashSet::new();
    let mut report = BuildReport::default();
    for page in &state.pages {
        if naming::has_placeholder(&page.path) {
            warn!(page = %page.path, "page path still has a routing placeholder");
        }
        let file = naming::page_file(&page.path);
        if !written.insert(file.clone()) {
            warn!(page = %page.path, "several pages write the same file, last one wins");
        }
        let html = document::assemble(&page.path, &page.markup, bundles, &config.project_name);
        fs.write(&dist.join(&file), html.as_bytes())?;
        report.pages.push(file);
    }

    if config.generate_sitemap {
        let urls: Vec<String> = report.pages.iter().map(|f| format!("/{f}")).collect();
        let xml = fs.generate_sitemap(&urls, &config.site_url);
        fs.write(&dist.join(SITEMAP_FILE), xml.as_bytes())?;
    }

    for asset in &state.assets {
        fs.write(&dist.join(&asset.path), &asset.bytes)?;
    }
    report.assets = state.assets.len();
    info!(
        pages = report.pages.len(),
        assets = report.assets,
        dist = %dist.display(),
        "wrote output"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::fs::{InMemoryFs, LocalFs};
    use crate::hooks::{BeforeBuildHook, Hook, HookError};
    use crate::test_helpers::{blog_source, setup_fixtures};

    fn project(fs: InMemoryFs) -> (Arc<InMemoryFs>, Project) {
        let fs = Arc::new(fs);
        let project = Project::new(".", fs.clone(), SiteConfig::default())
            .with_source(Arc::new(blog_source()));
        (fs, project)
    }

    fn output(fs: &InMemoryFs, file: &str) -> String {
        fs.read_text(&Path::new("dist").join(file)).unwrap()
    }

    fn run(project: &Project) -> BuildReport {
        build(project, &HookRegistry::new(), &CancellationToken::new()).unwrap()
    }

    // =========================================================================
    // End to end
    // =========================================================================

    #[test]
    fn component_and_item_directive_end_to_end() {
        let (fs, project) = project(
            InMemoryFs::new()
                .with_file("src/components/blog-title.html", "<h1>{%= blog_title %}</h1>")
                .with_file(
                    "src/index.html",
                    "<div cms-item cms-content-type=\"blog\" cms-content=\"abc\"><blog-title></blog-title></div>",
                ),
        );
        let report = run(&project);
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.pages, vec!["index.html"]);
        assert_eq!(report.components, 1);
        let html = output(&fs, "index.html");
        assert!(html.contains("<div><h1>Hello</h1></div>"), "{html}");
        assert!(!html.contains("cms-"));
        assert!(html.contains("<title>Spear</title>"));
    }

    #[test]
    fn styles_are_bundled_once_and_linked() {
        let (fs, project) = project(
            InMemoryFs::new()
                .with_file("src/components/card.html", "<style>.card{}</style><p>card</p>")
                .with_file("src/index.html", "<card></card><card></card>")
                .with_file("src/blog/post.html", "<card></card><script>go()</script>"),
        );
        run(&project);
        assert_eq!(output(&fs, "css.css"), ".card{}");
        assert_eq!(output(&fs, "script.js"), "go()");
        assert!(output(&fs, "blog/post.html").contains("href=\"../css.css\""));
        assert!(output(&fs, "index.html").contains("<p>card</p><p>card</p>"));
    }

    #[test]
    fn assets_and_sitemap_are_written() {
        let (fs, mut project) = project(
            InMemoryFs::new()
                .with_file("src/index.html", "<p>x</p>")
                .with_file("src/img/logo.svg", "<svg/>")
                .with_file("src/site.css", "body{}"),
        );
        project.config.generate_sitemap = true;
        project.config.site_url = "https://example.com".into();
        let report = run(&project);
        assert_eq!(report.assets, 2);
        assert_eq!(output(&fs, "img/logo.svg"), "<svg/>");
        assert_eq!(output(&fs, "site.css"), "body{}");
        assert!(output(&fs, SITEMAP_FILE).contains("<loc>https://example.com/index.html</loc>"));
    }

    #[test]
    fn scss_without_compiler_is_a_stylesheet_failure() {
        let (_, project) = project(
            InMemoryFs::new()
                .with_file("src/index.html", "<p>x</p>")
                .with_file("src/site.scss", "$a: 1;"),
        );
        let report = run(&project);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, Unit::Stylesheet);
        assert_eq!(report.pages, vec!["index.html"]);
    }

    // =========================================================================
    // Failure isolation
    // =========================================================================

    #[test]
    fn failed_page_is_omitted_and_siblings_build() {
        let (fs, project) = project(
            InMemoryFs::new()
                .with_file("src/bad.html", "<li cms-loop></li>")
                .with_file("src/good.html", "<p>ok</p>"),
        );
        let report = run(&project);
        assert_eq!(report.pages, vec!["good.html"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, Unit::Page);
        assert_eq!(report.failures[0].path, "/bad");
        assert!(!fs.exists(Path::new("dist/bad.html")));
    }

    #[test]
    fn builtin_tag_component_is_a_failure() {
        let (_, project) = project(
            InMemoryFs::new()
                .with_file("src/components/header.html", "<p>x</p>")
                .with_file("src/index.html", "<header></header>"),
        );
        let report = run(&project);
        assert_eq!(report.failures[0].unit, Unit::Component);
        assert_eq!(report.failures[0].path, "header.html");
        assert_eq!(report.pages, vec!["index.html"]);
    }

    #[test]
    fn fetch_failure_fails_only_that_page() {
        let (_, project) = project(
            InMemoryFs::new()
                .with_file("src/a.html", "<p cms-loop cms-content-type=\"nope\"></p>")
                .with_file("src/b.html", "<p>b</p>"),
        );
        let report = run(&project);
        assert_eq!(report.pages, vec!["b.html"]);
        assert!(report.failures[0].message.contains("nope"));
    }

    // =========================================================================
    // Hooks and cancellation
    // =========================================================================

    struct AddPage;

    impl Hook for AddPage {
        fn name(&self) -> &str {
            "add-page"
        }
    }

    impl BeforeBuildHook for AddPage {
        fn before_build(&self, state: &BuildState) -> Result<Option<BuildState>, HookError> {
            let mut next = state.clone();
            next.pages.push(Page::new("/extra", "<p>extra</p>"));
            Ok(Some(next))
        }
    }

    #[test]
    fn before_build_hook_pages_are_expanded() {
        let (fs, project) = project(InMemoryFs::new().with_file("src/index.html", "<p>x</p>"));
        let mut hooks = HookRegistry::new();
        hooks.add_before_build(Arc::new(AddPage));
        let report = build(&project, &hooks, &CancellationToken::new()).unwrap();
        assert_eq!(report.pages, vec!["index.html", "extra.html"]);
        assert!(output(&fs, "extra.html").contains("<p>extra</p>"));
    }

    #[test]
    fn cancelled_build_writes_nothing() {
        let (fs, project) = project(InMemoryFs::new().with_file("src/index.html", "<p>x</p>"));
        let cancel = CancellationToken::new();
        cancel.clone().cancel();
        let result = build(&project, &HookRegistry::new(), &cancel);
        assert!(matches!(result, Err(BuildError::Cancelled)));
        assert!(!fs.exists(Path::new("dist/index.html")));
    }

    #[test]
    fn previous_output_is_removed() {
        let (fs, project) = project(
            InMemoryFs::new()
                .with_file("dist/stale.html", "old")
                .with_file("src/index.html", "<p>x</p>"),
        );
        run(&project);
        assert!(!fs.exists(Path::new("dist/stale.html")));
    }

    #[test]
    fn check_reports_without_writing() {
        let (fs, project) = project(
            InMemoryFs::new()
                .with_file("src/components/card.html", "<p>card</p>")
                .with_file("src/index.html", "<card></card>"),
        );
        let report = check(&project).unwrap();
        assert_eq!(report.components, 1);
        assert_eq!(report.pages, vec!["index.html"]);
        assert!(!fs.exists(Path::new("dist")));
    }

    #[test]
    fn fixture_source_is_used_without_override() {
        let fs = Arc::new(
            InMemoryFs::new()
                .with_file("data/blog/abc.json", r#"{"fields": [{"identifier": "title", "input_type": "text", "value": "From disk"}]}"#)
                .with_file("src/index.html", "<p cms-item cms-content-type=\"blog\" cms-content=\"abc\">{%= blog_title %}</p>"),
        );
        let project = Project::new(".", fs.clone(), SiteConfig::default());
        let report = run(&project);
        assert!(report.is_success(), "{:?}", report.failures);
        assert!(output(&fs, "index.html").contains("<p>From disk</p>"));
    }

    #[test]
    fn fixture_project_builds_on_disk() {
        let tmp = setup_fixtures();
        let fs: Arc<dyn Filesystem> = Arc::new(LocalFs);
        let config = load_config(fs.as_ref(), tmp.path()).unwrap();
        let project = Project::new(tmp.path(), fs, config);
        let report = run(&project);
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.components, 2);

        let dist = tmp.path().join("dist");
        let index = std::fs::read_to_string(dist.join("index.html")).unwrap();
        assert!(index.contains("<h1>Hello</h1>"));
        assert!(index.contains("<a href=\"/blog/second.html\">Second</a>"));
        assert!(index.contains("<title>Fixture Blog</title>"));
        assert!(dist.join("blog/third.html").exists());
        assert!(dist.join("news/3.html").exists());
        assert!(dist.join("tags/go.html").exists());
        assert!(dist.join("images/logo.svg").exists());
        assert!(dist.join(SITEMAP_FILE).exists());
    }
}
