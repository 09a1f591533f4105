use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use taskwatch_core::{
    Batch, Config, FileConfig, Overrides, PollEvent, TaskPoller, TaskStatus, UploadFile,
};
use tokio_util::sync::CancellationToken;

mod output;

use output::{Palette, Report};

/// Taskwatch - upload files to a processing API and wait for the results
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// API base URL (default: http://localhost:8000)
    #[arg(long)]
    base_url: Option<String>,

    /// Status poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the fetched results as JSON to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Save each result's annotated image into this directory
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logging(args.verbose, !args.no_color);

    for path in &args.files {
        if !path.is_file() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    let file_config = FileConfig::load_or_default(args.config.as_deref())?;
    let overrides = Overrides {
        base_url: args.base_url,
        poll_interval_ms: args.interval_ms,
        timeout_secs: args.timeout,
        connect_timeout_secs: None,
    };
    let config = Config::resolve(overrides, |k| std::env::var(k).ok(), file_config)?;

    let mut uploads = Vec::with_capacity(args.files.len());
    for path in &args.files {
        uploads.push(
            UploadFile::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let poller = TaskPoller::from_config(config)?;
    let base_url = poller.config().base_url.clone();

    let batch = tokio::select! {
        _ = cancel.cancelled() => anyhow::bail!("Cancelled before submission completed"),
        batch = poller.submit(uploads) => {
            batch.with_context(|| format!("Submission to {} failed", base_url))?
        }
    };

    let (batch, cancelled) = wait_for_batch(&poller, batch, &cancel).await?;
    let mut report = fetch_results(&poller, &batch, cancelled).await;
    if let Some(dir) = &args.download_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        download_images(&poller, &mut report, dir).await;
    }

    let palette = Palette::new(!args.no_color);
    for line in output::render(&batch, &report, palette) {
        println!("{line}");
    }

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report.results)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("wrote {} result(s) to {}", report.results.len(), path.display());
    }

    Ok(())
}

fn init_logging(verbose: bool, color: bool) {
    let level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("taskwatch")
        .build();
    let colors = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, colors);
}

/// Poll until the batch completes or the user cancels. Returns the final
/// batch and whether polling was cut short.
async fn wait_for_batch(
    poller: &TaskPoller,
    batch: Batch,
    cancel: &CancellationToken,
) -> anyhow::Result<(Batch, bool)> {
    let progress = ProgressBar::new(batch.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress.set_position(batch.terminal_count() as u64);

    let mut terminal = batch.terminal_count();
    let mut handle = poller.poll_all(batch);
    let mut cancelled = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                handle.cancel();
                progress.set_message("cancelled");
            }
            event = handle.next_event() => match event {
                Some(PollEvent::StatusChanged { task_id, status, .. }) => {
                    log::debug!("{} -> {}", task_id, status);
                    if status.is_terminal() {
                        terminal += 1;
                        progress.set_position(terminal as u64);
                    }
                    progress.set_message(format!("{task_id}: {status}"));
                }
                Some(PollEvent::Finished { .. }) => {
                    progress.set_message("done");
                }
                None => break,
            }
        }
    }
    progress.finish_and_clear();

    let batch = handle.join().await?;
    Ok((batch, cancelled))
}

/// Fetch each successful task's result once.
async fn fetch_results(poller: &TaskPoller, batch: &Batch, cancelled: bool) -> Report {
    let mut report = Report {
        cancelled,
        ..Report::default()
    };
    for task in batch.tasks() {
        if task.status != TaskStatus::Success {
            continue;
        }
        match poller.view_result(batch, &task.id).await {
            Ok(result) => report.results.push(result),
            Err(e) => {
                log::warn!("result for {} unavailable: {}", task.id, e);
                report.unavailable.push((task.id.clone(), e.to_string()));
            }
        }
    }
    report
}

/// Save the annotated image of every fetched result into `dir`.
async fn download_images(poller: &TaskPoller, report: &mut Report, dir: &Path) {
    for result in &report.results {
        match poller.download_result(result, dir).await {
            Ok(path) => report.saved.push((result.task_id.clone(), path)),
            Err(e) => {
                log::warn!("download for {} failed: {}", result.task_id, e);
                report
                    .unavailable
                    .push((result.task_id.clone(), format!("download failed: {e}")));
            }
        }
    }
}
