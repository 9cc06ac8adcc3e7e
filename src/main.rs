use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bundlecov::cli::{cmd_analyze, cmd_bundles, cmd_sizes, Style};
use bundlecov::config::{AnalysisConfig, PageConfig};

/// bundlecov: attribute web bundle bytes to their original sources and
/// reconcile coverage across page loads.
#[derive(Parser)]
#[command(name = "bundlecov", version, about)]
struct Cli {
    /// Log analysis progress to stderr.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full report: page groups, bundles and first-party sizes.
    Analyze(RunArgs),

    /// List the largest original source files of each bundle.
    Bundles(RunArgs),

    /// Show first-party script sizes and the pages that load them.
    Sizes(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the TOML analysis config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the captured page artifacts.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Extra page as name=url. May be repeated.
    #[arg(long = "page", value_parser = parse_page)]
    pages: Vec<PageConfig>,

    /// Rows per ranked table before the rest is folded.
    #[arg(long)]
    top: Option<usize>,

    /// Reject mappings that point outside the generated code.
    #[arg(long)]
    strict: bool,

    /// Threads used for group audits.
    #[arg(long)]
    workers: Option<usize>,

    /// Output style.
    #[arg(long, value_enum, default_value_t = Style::Text)]
    style: Style,
}

fn parse_page(s: &str) -> Result<PageConfig, String> {
    PageConfig::parse_pair(s).map_err(|e| e.to_string())
}

impl RunArgs {
    fn into_config(self) -> Result<(AnalysisConfig, Style)> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        config.pages.extend(self.pages);
        if let Some(top) = self.top {
            config.top_n = top;
        }
        if self.strict {
            config.strict_mappings = true;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        Ok((config, self.style))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bundlecov=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug || std::env::var_os("RUST_LOG").is_some() {
        init_tracing();
    }

    let output = match cli.command {
        Commands::Analyze(args) => {
            let (config, style) = args.into_config()?;
            cmd_analyze(&config, style)?
        }
        Commands::Bundles(args) => {
            let (config, style) = args.into_config()?;
            cmd_bundles(&config, style)?
        }
        Commands::Sizes(args) => {
            let (config, style) = args.into_config()?;
            cmd_sizes(&config, style)?
        }
    };
    print!("{output}");
    Ok(())
}
