use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use ratatui::crossterm::event;
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::CrosstermBackend;
use ratatui::Terminal;
use taskwatch_core::{Config, FileConfig, Overrides, TaskPoller, UploadFile};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod action;
mod app;
mod backend;
mod input;
mod logging;
mod model;
mod theme;
mod tui_event;
mod view;

use app::App;
use tui_event::Command;

/// Taskwatch TUI - upload files to a processing API and watch their tasks.
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

    /// Directory where annotated images are saved
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,

    /// Where to write the log
    #[arg(long, default_value = "taskwatch.log")]
    log_file: PathBuf,

    /// Log debug messages
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(&args.log_file, level);

    // Validate the files before touching the terminal
    for path in &args.files {
        if !path.is_file() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }
    if !args.download_dir.is_dir() {
        anyhow::bail!("Download directory not found: {}", args.download_dir.display());
    }

    // Resolve config from CLI flags > env vars > config file > defaults
    let file_config = FileConfig::load_or_default(args.config.as_deref())?;
    let overrides = Overrides {
        base_url: args.base_url,
        poll_interval_ms: args.interval_ms,
        timeout_secs: args.timeout,
        connect_timeout_secs: None,
    };
    let config = Config::resolve(overrides, |k| std::env::var(k).ok(), file_config)?;
    log::info!("using API at {}", config.base_url);

    let mut uploads = Vec::with_capacity(args.files.len());
    for path in &args.files {
        uploads.push(UploadFile::from_path(path).await?);
    }
    let file_names: Vec<String> = uploads.iter().map(|u| u.file_name.clone()).collect();

    let base_url = config.base_url.clone();
    let poller = TaskPoller::from_config(config)?;

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    // Install panic hook that restores terminal before printing panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Drain any stray input events (e.g. Enter keypress from launching the command)
    while event::poll(Duration::from_millis(50)).unwrap_or(false) {
        let _ = event::read();
    }

    let mut app = App::new(base_url, file_names);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let backend_cancel = cancel.clone();
    let download_dir = args.download_dir;
    let backend_task = tokio::spawn(async move {
        backend::run(poller, uploads, download_dir, cmd_rx, tx, backend_cancel).await;
    });
    let _ = cmd_tx.send(Command::Submit);

    // Also handle Ctrl+C at the OS level for clean shutdown
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    // Main event loop
    let tick_rate = Duration::from_millis(100);

    loop {
        terminal.draw(|f| app.view(f))?;

        tokio::select! {
            // Backend events (non-blocking drain)
            maybe_event = rx.recv() => {
                if let Some(backend_event) = maybe_event {
                    app.handle_backend_event(backend_event);
                    while let Ok(evt) = rx.try_recv() {
                        app.handle_backend_event(evt);
                    }
                }
            }
            // Terminal input events
            command = async {
                if event::poll(tick_rate).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        return app.update(input::map_event(&evt));
                    }
                }
                None
            } => {
                if let Some(command) = command {
                    let _ = cmd_tx.send(command);
                }
            }
        }

        app.update(action::Action::Tick);

        if app.should_quit || cancel.is_cancelled() {
            cancel.cancel();
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    drop(cmd_tx);
    let _ = backend_task.await;
    log::info!("shutdown complete");

    Ok(())
}
