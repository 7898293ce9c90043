use std::path::PathBuf;
use std::process::ExitCode;

use handbook_pdf::output::{GenerateOutput, HandbookOutput};
use handbook_pdf::{GenerationRequest, HandbookError, Pipeline};
use tracing::debug;

use crate::cli::{OutputFormat, PipelineArgs};
use crate::formatting::{render_error, write_output};
use crate::settings::{apply_overrides, load_config, log_effective_config};

/// Run the generate command.
pub async fn run_generate(
    config_path: Option<PathBuf>,
    url: String,
    pipeline_args: PipelineArgs,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(config_path.as_deref())
        .and_then(|cfg| apply_overrides(cfg, &pipeline_args))
    {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    log_effective_config(&config, config_path.as_deref());

    let request = match GenerationRequest::parse(&url) {
        Ok(request) => request,
        Err(err) => return render_error(err, format, output),
    };
    let source_url = request.source_url.to_string();

    let pipeline = match Pipeline::new(&config) {
        Ok(pipeline) => pipeline,
        Err(err) => return render_error(err, format, output),
    };
    debug!(?pipeline, "pipeline ready");

    let report = match pipeline.run(request).await {
        Ok(report) => report,
        Err(err) => return render_error(err, format, output),
    };

    let body = HandbookOutput::Generate(GenerateOutput::from_report(
        &report,
        &source_url,
        config.browser.page_size,
    ));
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(
            HandbookError::Internal(format!("cannot write result: {err}")),
            format,
            None,
        );
    }
    ExitCode::SUCCESS
}
