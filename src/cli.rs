use clap::{Parser, Subcommand, ValueEnum};
use handbook_pdf::config::{ReadinessStrategy, ResourceKind};
use handbook_pdf::Viewport;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "handbook-pdf")]
#[command(
    version,
    about = "Handbook PDF - Render every section of a handbook page as one page of a merged PDF",
    long_about = "Handbook PDF\n\nModes:\n- generate: load a handbook print view in headless Chrome, capture each section as one PDF page, and merge them into output/handbook-<uuid>.pdf.\n- serve: expose the same pipeline over HTTP (GET /print/handbook?targetUrl=...) and serve generated files under /output.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) for browser, readiness, section and timeout defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

/// Pipeline overrides shared by `generate` and `serve`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PipelineArgs {
    #[arg(
        long,
        env = "HANDBOOK_PDF_OUTPUT_DIR",
        value_name = "PATH",
        help = "Directory for generated PDFs (diagnostics go to <dir>/diagnostics)"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "HANDBOOK_PDF_CHROME",
        value_name = "PATH",
        help = "Chrome/Chromium executable (auto-detected when omitted)"
    )]
    pub chrome: Option<PathBuf>,

    #[arg(long, value_enum, help = "When the page counts as fully loaded")]
    pub readiness: Option<ReadinessArg>,

    #[arg(long, value_name = "SECS", help = "Navigation + readiness timeout (seconds)")]
    pub nav_timeout: Option<u64>,

    #[arg(
        long,
        value_name = "MS",
        help = "Pause after isolating a section before printing it (milliseconds)"
    )]
    pub settle_delay_ms: Option<u64>,

    #[arg(long, value_name = "WIDTHxHEIGHT", help = "Viewport and printed page size in CSS pixels")]
    pub page_size: Option<Viewport>,

    #[arg(
        long,
        value_delimiter = ',',
        value_name = "KINDS",
        help = "Resource kinds to block while loading (image,font,stylesheet,media,script,xhr,fetch,websocket,other)"
    )]
    pub block: Option<Vec<ResourceKind>>,

    #[arg(long, help = "Do not write diagnostic bundles")]
    pub no_diagnostics: bool,

    #[arg(long, help = "Also record diagnostics after every captured section")]
    pub per_section_diagnostics: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one handbook URL into a merged PDF
    Generate {
        #[arg(help = "Handbook URL (usually the print view, e.g. https://host/handbook?print=true)")]
        url: String,

        #[command(flatten)]
        pipeline: PipelineArgs,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Write the result payload to this file (stdout if omitted)")]
        output: Option<PathBuf>,
    },

    /// Serve the pipeline over HTTP
    Serve {
        #[arg(long, env = "PORT", default_value = "3000", help = "Port to listen on")]
        port: u16,

        #[arg(long, default_value = "0.0.0.0", help = "Address to bind")]
        host: IpAddr,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReadinessArg {
    NetworkIdle,
    AssetComplete,
}

impl From<ReadinessArg> for ReadinessStrategy {
    fn from(arg: ReadinessArg) -> Self {
        match arg {
            ReadinessArg::NetworkIdle => ReadinessStrategy::NetworkIdle,
            ReadinessArg::AssetComplete => ReadinessStrategy::AssetComplete,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
