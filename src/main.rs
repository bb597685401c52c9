mod config;
mod encoder;
mod frame;
mod pipeline;
mod progress;
mod scan;
mod util;

use anyhow::Result;
use clap::Parser;
use config::{Container, ConvertConfig, Resolution, FRAMES_PER_SECOND};
use pipeline::{CancelToken, ConversionOutcome, ConvertSummary};
use progress::{ProgressConfig, ProgressMode, ProgressReporter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stillcast",
    version,
    about = "Build a letterboxed H.264 slideshow video from a folder of images (mtime order, 2 fps)"
)]
struct Cli {
    /// Directory scanned recursively for .png/.jpg/.jpeg/.gif files
    root: PathBuf,

    /// Output video path; omit it to stop after scanning without writing
    /// anything (the cancelled-save behaviour)
    output: Option<PathBuf>,

    /// Target resolution as <width>x<height>
    #[arg(long, default_value = "3840x2160")]
    resolution: Resolution,

    /// Container used when the output path has no recognized extension
    #[arg(long, value_enum, default_value_t = Container::Mp4)]
    container: Container,

    /// Decode worker threads. Default: CPU count, capped at 8.
    #[arg(long)]
    workers: Option<usize>,

    /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
    #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConvertConfig {
        root: cli.root,
        resolution: cli.resolution,
        container: cli.container,
        workers: cli.workers.unwrap_or_else(|| num_cpus::get().clamp(1, 8)),
    };
    config.validate()?;

    // An empty output path is the same cancellation as no output path.
    let output = cli.output.filter(|p| !p.as_os_str().is_empty());
    if output.is_some() {
        util::ensure_ffmpeg_available()?;
    }

    let reporter = ProgressReporter::new("convert", ProgressConfig::new(cli.progress));
    let handle = reporter.handle();

    let summary = pipeline::convert(&config, output.as_deref(), &handle, &CancelToken::new())?;

    let progress_outcome = reporter.finish(outcome_message(&summary.outcome));
    print_summary(&config, &summary, progress_outcome.elapsed);
    for warning in progress_outcome.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

fn outcome_message(outcome: &ConversionOutcome) -> String {
    match outcome {
        ConversionOutcome::Completed { output, .. } => {
            format!("video written to {}", output.display())
        }
        ConversionOutcome::NoImagesFound => "no images found".to_string(),
        ConversionOutcome::Cancelled => "cancelled, nothing written".to_string(),
    }
}

fn print_summary(config: &ConvertConfig, summary: &ConvertSummary, elapsed: std::time::Duration) {
    let formats = if summary.format_counts.is_empty() {
        "-".to_string()
    } else {
        summary
            .format_counts
            .iter()
            .map(|(ext, n)| format!("{ext}={n}"))
            .collect::<Vec<_>>()
            .join(",")
    };

    match &summary.outcome {
        ConversionOutcome::Completed {
            output,
            frames,
            skipped,
        } => {
            let video_secs = *frames as f64 / f64::from(FRAMES_PER_SECOND);
            println!(
                "Convert summary: output={} resolution={} fps={} frames={} video_length={:.1}s skipped={} folders={} formats={} elapsed={}",
                output.display(),
                config.resolution,
                FRAMES_PER_SECOND,
                frames,
                video_secs,
                skipped,
                summary.folders_scanned,
                formats,
                util::fmt_duration(elapsed),
            );
        }
        ConversionOutcome::NoImagesFound => {
            println!(
                "Convert summary: no images found under {} (folders={} formats={} elapsed={})",
                config.root.display(),
                summary.folders_scanned,
                formats,
                util::fmt_duration(elapsed),
            );
        }
        ConversionOutcome::Cancelled => {
            println!(
                "Convert summary: cancelled, nothing written (folders={} formats={} elapsed={})",
                summary.folders_scanned,
                formats,
                util::fmt_duration(elapsed),
            );
        }
    }
}
