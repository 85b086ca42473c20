use simplelog::*;
use std::fs::File;

/// Build and install a combined console/file logger. simplelog allows only one
/// global logger per process, repeated calls after the first are ignored.
pub fn init_logger(level: LevelFilter, log_to_console: bool, log_to_file: Option<&str>) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if log_to_console {
        loggers.push(TermLogger::new(
            level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }

    if let Some(filename) = log_to_file {
        if let Ok(file) = File::create(filename) {
            loggers.push(WriteLogger::new(level, Config::default(), file));
        }
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
}
