use clap::{Parser, Subcommand};
use spear::config::{self, SiteConfig};
use spear::fs::{Filesystem, LocalFs};
use spear::hooks::HookRegistry;
use spear::pipeline::{self, CancellationToken, Project};
use spear::{logging, output, plugins};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "spear")]
#[command(about = "Component-based static site generator with CMS content expansion")]
#[command(long_about = "\
Component-based static site generator with CMS content expansion

Pages are HTML templates. Files in the components directory become custom
tags, and cms-* attributes pull records from the content source.

Project structure:

  spear.toml                       # Site config (optional)
  src/
  ├── components/
  │   └── blog-title.html          # <blog-title> component, <slot> for children
  ├── index.html                   # → dist/index.html
  ├── blog/[alias].html            # one page per record of the cms-item type
  ├── tags/[tags].html             # one page per distinct tag (cms-tag-loop)
  ├── news/[pagination].html       # one page per bucket of the cms-loop
  ├── style.scss                   # → dist/style.css
  └── images/logo.svg              # copied as is
  data/
  └── blog/abc.json                # fixture records, one per file

Run 'spear gen-config' to generate a documented spear.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    source: PathBuf,

    /// Output directory (overrides dist_dir)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log every pipeline step
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site into the output directory
    Build {
        /// Mark substituted fields with data-spear attributes
        #[arg(long)]
        debug: bool,
    },
    /// Register components and discover pages without writing anything
    Check,
    /// Print a stock spear.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    logging::init_tracing(cli.quiet, cli.verbose);
    let fs: Arc<dyn Filesystem> = Arc::new(LocalFs);
    let mut site_config = config::load_config(fs.as_ref(), &cli.source)?;
    if let Some(output) = &cli.output {
        site_config.dist_dir = output.to_string_lossy().into_owned();
    }

    let report = match cli.command {
        Command::Build { debug } => {
            site_config.debug_mode |= debug;
            init_thread_pool(&site_config);
            let mut hooks = HookRegistry::new();
            plugins::register_builtin(&mut hooks, &site_config.plugins);
            info!(root = %cli.source.display(), plugins = hooks.len(), "building");
            let project = Project::new(&cli.source, fs, site_config);
            let report = pipeline::build(&project, &hooks, &CancellationToken::new())?;
            output::print_build_report(&report);
            report
        }
        Command::Check => {
            let project = Project::new(&cli.source, fs, site_config);
            let report = pipeline::check(&project)?;
            output::print_check_report(&report);
            report
        }
        Command::GenConfig => return Ok(()),
    };

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores.
fn init_thread_pool(site_config: &SiteConfig) {
    let threads = config::effective_threads(&site_config.processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
