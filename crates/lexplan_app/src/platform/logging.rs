//! Logging setup for the console runner.
//!
//! Defaults to `./lexplan.log` so log lines never interleave with the
//! rendered workflow output; `LEXPLAN_LOG=term` or `LEXPLAN_LOG=both`
//! switches destinations.

use std::fs::File;
use std::path::Path;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

const LOG_FILE: &str = "./lexplan.log";
const DESTINATION_VAR: &str = "LEXPLAN_LOG";

enum Destination {
    File,
    Terminal,
    Both,
}

impl Destination {
    fn from_env() -> Self {
        match std::env::var(DESTINATION_VAR).as_deref() {
            Ok("term") | Ok("terminal") => Destination::Terminal,
            Ok("both") => Destination::Both,
            _ => Destination::File,
        }
    }
}

/// Initializes the global logger. Safe to call once at startup only.
pub(crate) fn initialize() {
    let level = LevelFilter::Info;
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    match Destination::from_env() {
        Destination::File => {
            if let Some(logger) = file_logger(level, config) {
                loggers.push(logger);
            }
        }
        Destination::Terminal => {
            loggers.push(terminal_logger(level, config));
        }
        Destination::Both => {
            loggers.push(terminal_logger(level, config.clone()));
            if let Some(logger) = file_logger(level, config) {
                loggers.push(logger);
            }
        }
    }

    let _ = CombinedLogger::init(loggers);
}

fn terminal_logger(level: LevelFilter, config: Config) -> Box<TermLogger> {
    TermLogger::new(level, config, TerminalMode::Mixed, ColorChoice::Auto)
}

fn file_logger(level: LevelFilter, config: Config) -> Option<Box<WriteLogger<File>>> {
    match File::create(Path::new(LOG_FILE)) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: could not create log file {LOG_FILE}: {err}");
            None
        }
    }
}
