use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use handbook_pdf::{server, Pipeline};

use crate::cli::{OutputFormat, PipelineArgs};
use crate::formatting::render_error;
use crate::settings::{apply_overrides, load_config, log_effective_config};

/// Run the HTTP adapter until interrupted.
pub async fn run_serve(
    config_path: Option<PathBuf>,
    host: IpAddr,
    port: u16,
    pipeline_args: PipelineArgs,
) -> ExitCode {
    let config = match load_config(config_path.as_deref())
        .and_then(|cfg| apply_overrides(cfg, &pipeline_args))
    {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, OutputFormat::Json, None),
    };
    log_effective_config(&config, config_path.as_deref());

    let pipeline = match Pipeline::new(&config) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(err) => return render_error(err, OutputFormat::Json, None),
    };

    match server::serve(pipeline, SocketAddr::new(host, port)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => render_error(err, OutputFormat::Json, None),
    }
}
