use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use handbook_pdf::output::{ErrorOutput, HandbookOutput, HANDBOOK_OUTPUT_VERSION};
use handbook_pdf::HandbookError;

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &HandbookOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the fatal exit code.
pub fn render_error(err: HandbookError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let error_payload = err.to_payload();
    let payload = HandbookOutput::Error(ErrorOutput {
        version: HANDBOOK_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    ExitCode::from(2)
}

fn write_json_output(
    body: &HandbookOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

fn write_pretty_output(body: &HandbookOutput, output: Option<&Path>) -> io::Result<()> {
    let use_human = output.is_none() && std::io::stdout().is_terminal();

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &HandbookOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        HandbookOutput::Generate(out) => {
            let header = color("[GENERATE]", "32", colorize);
            let pages = if out.pages == 1 { "page" } else { "pages" };
            writeln!(buf, "{} {} ({} {})", header, out.filename, out.pages, pages).ok();
            writeln!(buf, "Source:  {}", out.source_url).ok();
            writeln!(buf, "Path:    {}", out.filepath.display()).ok();
            writeln!(
                buf,
                "Page:    {} px ({:.2}in x {:.2}in)",
                out.page_size,
                out.page_size.width_inches(),
                out.page_size.height_inches()
            )
            .ok();
            writeln!(buf, "Request: {} in {} ms", out.request_id, out.elapsed_ms).ok();
            if let Some(bundle) = &out.diagnostics {
                writeln!(buf, "Diagnostics: {}", bundle.directory.display()).ok();
                for file in &bundle.files {
                    writeln!(buf, "- {}", file.display()).ok();
                }
            }
        }
        HandbookOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or_else(|| out.error.message.as_str());
            writeln!(buf, "{} {} ({})", header, message, out.error.kind).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
        }
    }
    buf
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}
