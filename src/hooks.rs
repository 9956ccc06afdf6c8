//! Build hooks.
//!
//! Plugins extend a build through typed hook traits. A plugin implements
//! [`Hook`] for its name plus any of the stage traits, and is registered
//! once per stage it takes part in:
//!
//! | Stage | Trait | Runs |
//! |-------|-------|------|
//! | configuration | [`ConfigHook`] | after `spear.toml` is loaded |
//! | before build | [`BeforeBuildHook`] | after discovery, before any page is expanded |
//! | after build | [`AfterBuildHook`] | after every page is expanded and routed |
//! | bundle | [`BundleHook`] | right before output is written |
//! | pagination | [`PaginationHook`] | per pagination bucket, instead of nav token replacement |
//! | routing | [`RoutingHook`] | per routed page, instead of the default fan-out |
//!
//! State hooks receive the current value by reference and return either a
//! modified copy or `None` to leave it as is. Hooks run in registration
//! order. A failing hook is logged with its plugin name and treated as if it
//! had returned `None`; it never fails the build.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::config::SiteConfig;
use crate::fs::{Filesystem, FsError};
use crate::routing::Bucket;
use crate::types::{BuildState, Page};

#[derive(Error, Debug)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Project access for hooks that read their own settings files.
#[derive(Clone, Copy)]
pub struct HookEnv<'a> {
    pub fs: &'a dyn Filesystem,
    pub root: &'a Path,
}

/// Identity shared by every hook.
pub trait Hook: Send + Sync {
    /// Plugin name used in log messages.
    fn name(&self) -> &str;
}

pub trait ConfigHook: Hook {
    fn configure(&self, config: &SiteConfig, env: HookEnv<'_>)
    -> Result<Option<SiteConfig>, HookError>;
}

pub trait BeforeBuildHook: Hook {
    fn before_build(&self, state: &BuildState) -> Result<Option<BuildState>, HookError>;
}

pub trait AfterBuildHook: Hook {
    fn after_build(&self, state: &BuildState) -> Result<Option<BuildState>, HookError>;
}

pub trait BundleHook: Hook {
    fn bundle(&self, state: &BuildState) -> Result<Option<BuildState>, HookError>;
}

/// One page of a paginated list, offered to [`PaginationHook`]s.
#[derive(Debug, Clone, Copy)]
pub struct PaginationRequest<'a> {
    /// Logical path, still containing `[pagination]`.
    pub path: &'a str,
    /// The page with the bucket's records already spliced in.
    pub markup: &'a str,
    pub loop_id: Option<&'a str>,
    pub bucket: &'a Bucket,
    /// Every bucket of the same list, in page order.
    pub buckets: &'a [Bucket],
}

pub trait PaginationHook: Hook {
    /// Final markup for the page, or `None` to use the default navigation
    /// token replacement.
    fn paginate(&self, request: &PaginationRequest<'_>) -> Result<Option<String>, HookError>;
}

pub trait RoutingHook: Hook {
    /// Output pages for a page whose path has routing placeholders, or
    /// `None` to use the default fan-out.
    fn route(&self, page: &Page) -> Result<Option<Vec<Page>>, HookError>;
}

/// Registered hooks, per stage, in registration order.
#[derive(Default, Clone)]
pub struct HookRegistry {
    config: Vec<Arc<dyn ConfigHook>>,
    before_build: Vec<Arc<dyn BeforeBuildHook>>,
    after_build: Vec<Arc<dyn AfterBuildHook>>,
    bundle: Vec<Arc<dyn BundleHook>>,
    pagination: Vec<Arc<dyn PaginationHook>>,
    routing: Vec<Arc<dyn RoutingHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_config(&mut self, hook: Arc<dyn ConfigHook>) {
        self.config.push(hook);
    }

    pub fn add_before_build(&mut self, hook: Arc<dyn BeforeBuildHook>) {
        self.before_build.push(hook);
    }

    pub fn add_after_build(&mut self, hook: Arc<dyn AfterBuildHook>) {
        self.after_build.push(hook);
    }

    pub fn add_bundle(&mut self, hook: Arc<dyn BundleHook>) {
        self.bundle.push(hook);
    }

    pub fn add_pagination(&mut self, hook: Arc<dyn PaginationHook>) {
        self.pagination.push(hook);
    }

    pub fn add_routing(&mut self, hook: Arc<dyn RoutingHook>) {
        self.routing.push(hook);
    }

    /// Total number of registrations across all stages.
    pub fn len(&self) -> usize {
        self.config.len()
            + self.before_build.len()
            + self.after_build.len()
            + self.bundle.len()
            + self.pagination.len()
            + self.routing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn run_config(&self, config: SiteConfig, env: HookEnv<'_>) -> SiteConfig {
        self.config.iter().fold(config, |current, hook| {
            keep_on_failure(hook.name(), "configuration", hook.configure(&current, env))
                .unwrap_or(current)
        })
    }

    pub fn run_before_build(&self, state: BuildState) -> BuildState {
        self.before_build.iter().fold(state, |current, hook| {
            keep_on_failure(hook.name(), "before-build", hook.before_build(&current))
                .unwrap_or(current)
        })
    }

    pub fn run_after_build(&self, state: BuildState) -> BuildState {
        self.after_build.iter().fold(state, |current, hook| {
            keep_on_failure(hook.name(), "after-build", hook.after_build(&current))
                .unwrap_or(current)
        })
    }

    pub fn run_bundle(&self, state: BuildState) -> BuildState {
        self.bundle.iter().fold(state, |current, hook| {
            keep_on_failure(hook.name(), "bundle", hook.bundle(&current)).unwrap_or(current)
        })
    }

    /// Markup from the first pagination hook that produces some.
    pub fn run_pagination(&self, request: &PaginationRequest<'_>) -> Option<String> {
        self.pagination
            .iter()
            .find_map(|hook| keep_on_failure(hook.name(), "pagination", hook.paginate(request)))
    }

    /// Pages from every routing hook that handles `page`, or `None` when
    /// no hook does.
    pub fn run_routing(&self, page: &Page) -> Option<Vec<Page>> {
        let mut handled = false;
        let mut pages = Vec::new();
        for hook in &self.routing {
            if let Some(routed) = keep_on_failure(hook.name(), "routing", hook.route(page)) {
                handled = true;
                pages.extend(routed);
            }
        }
        handled.then_some(pages)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |hooks: Vec<&str>| hooks.join(", ");
        f.debug_struct("HookRegistry")
            .field("config", &names(self.config.iter().map(|h| h.name()).collect()))
            .field("before_build", &names(self.before_build.iter().map(|h| h.name()).collect()))
            .field("after_build", &names(self.after_build.iter().map(|h| h.name()).collect()))
            .field("bundle", &names(self.bundle.iter().map(|h| h.name()).collect()))
            .field("pagination", &names(self.pagination.iter().map(|h| h.name()).collect()))
            .field("routing", &names(self.routing.iter().map(|h| h.name()).collect()))
            .finish()
    }
}

fn keep_on_failure<T>(plugin: &str, stage: &str, result: Result<Option<T>, HookError>) -> Option<T> {
    result.unwrap_or_else(|e| {
        warn!(plugin, stage, error = %e, "plugin hook failed");
        None
    })
}
