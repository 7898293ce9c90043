mod cli;
mod commands;
mod formatting;
mod settings;

use std::io;
use std::process::ExitCode;

use cli::Commands;
use commands::{run_generate, run_serve};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Generate {
            url,
            pipeline,
            format,
            output,
        } => run_generate(args.config, url, pipeline, format, output).await,
        Commands::Serve {
            port,
            host,
            pipeline,
        } => run_serve(args.config, host, port, pipeline).await,
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_writer(io::stderr)
        .init();
}

/// `RUST_LOG` wins when it parses; `--verbose` only moves the fallback from `info` to `debug`.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}
