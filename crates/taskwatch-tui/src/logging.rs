//! File logging for the TUI. The terminal belongs to the UI, so nothing is
//! written to stdout or stderr while it runs.

use std::fs::File;
use std::path::Path;

use log::LevelFilter;
use simplelog::{Config, ConfigBuilder, WriteLogger};

/// Install a file logger at `path`. Failure to create the file is reported
/// on stderr before the UI starts and leaves logging disabled.
pub fn initialize(path: &Path, level: LevelFilter) {
    match File::create(path) {
        Ok(file) => {
            let _ = WriteLogger::init(level, build_config(), file);
        }
        Err(err) => {
            eprintln!("Warning: Could not create log file at {}: {}", path.display(), err);
        }
    }
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .add_filter_allow_str("taskwatch")
        .build()
}
