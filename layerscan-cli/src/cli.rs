//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use layerscan_core::config::LayerscanConfig;

/// Config file used when `--config` is not given. A missing file falls back to defaults.
pub const DEFAULT_CONFIG_PATH: &str = "layerscan.toml";

/// layerscan -- artifact inspection with a layered analysis cache.
///
/// Use `layerscan <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "layerscan", version, about, long_about = None)]
pub struct Cli {
    /// Path to the layerscan.toml configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect a local filesystem tree.
    Fs(ScanArgs),

    /// Inspect a source repository checkout (`.git` is skipped).
    Repo(ScanArgs),

    /// Inspect an extracted container image directory (manifest.json + config + layer dirs).
    Image(ScanArgs),

    /// Inspect a CycloneDX JSON SBOM document.
    Sbom(ScanArgs),

    /// Manage the analysis cache.
    Cache(CacheArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// List registered analyzers and their versions.
    Analyzers,
}

// ---- fs / repo / image / sbom ----

/// Inspect an artifact and print the merged view.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Artifact path.
    pub target: PathBuf,

    /// Print every package instead of a summary.
    #[arg(long)]
    pub list_all_pkgs: bool,

    #[command(flatten)]
    pub options: ScanOptions,

    #[command(flatten)]
    pub cache: CacheOptions,
}

/// Scan settings that override the `[scan]` section.
#[derive(Args, Debug, Default)]
pub struct ScanOptions {
    /// Files to skip, relative to the artifact root (comma separated or repeated).
    #[arg(long, value_delimiter = ',')]
    pub skip_files: Vec<String>,

    /// Directories to skip, relative to the artifact root.
    #[arg(long, value_delimiter = ',')]
    pub skip_dirs: Vec<String>,

    /// Analyzer types to disable (see `layerscan analyzers`).
    #[arg(long = "disable-analyzer", value_delimiter = ',')]
    pub disabled_analyzers: Vec<String>,

    /// Number of file analysis workers.
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Treat the source as slow (single worker).
    #[arg(long)]
    pub slow: bool,
}

impl ScanOptions {
    /// Apply the flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut LayerscanConfig) {
        if !self.skip_files.is_empty() {
            config.scan.skip_files = self.skip_files.clone();
        }
        if !self.skip_dirs.is_empty() {
            config.scan.skip_dirs = self.skip_dirs.clone();
        }
        if !self.disabled_analyzers.is_empty() {
            config.scan.disabled_analyzers = self.disabled_analyzers.clone();
        }
        if let Some(parallel) = self.parallel {
            config.scan.parallel = parallel;
        }
        if self.slow {
            config.scan.slow = true;
        }
    }
}

/// Cache settings that override the `[cache]` section.
#[derive(Args, Debug, Default)]
pub struct CacheOptions {
    /// Cache backend (fs, memory, remote).
    #[arg(long)]
    pub cache_backend: Option<String>,

    /// Local cache directory (fs backend).
    #[arg(long)]
    pub cache_dir: Option<String>,
}

impl CacheOptions {
    /// Apply the flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut LayerscanConfig) {
        if let Some(backend) = &self.cache_backend {
            config.cache.backend = backend.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = dir.clone();
        }
    }
}

// ---- cache ----

/// Manage the analysis cache.
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached blob and artifact record.
    Clean {
        #[command(flatten)]
        cache: CacheOptions,
    },
}

// ---- config ----

/// Manage layerscan configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, cache, scan).
        #[arg(long)]
        section: Option<String>,
    },
}
