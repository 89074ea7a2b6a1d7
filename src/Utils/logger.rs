use chrono::Local;
use log::info;
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;

/// Initialize terminal logging for the fitting solvers.
///
/// Safe to call more than once: if a global logger is already installed the
/// call is a no-op.
pub fn init_logging(level: LevelFilter) {
    let logger_instance = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
    if logger_instance.is_ok() {
        info!("logging initialized with level {}", level);
    }
}

/// Initialize terminal logging plus a timestamped log file.
///
/// Returns the name of the log file, or `None` when the file could not be
/// created or a logger was already installed (terminal logging is still
/// attempted in that case).
pub fn init_logging_with_file(level: LevelFilter) -> Option<String> {
    let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let name = format!("fit_log_{}.txt", date_and_time);
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    let file = match File::create(&name) {
        Ok(f) => Some(f),
        Err(_) => None,
    };
    let have_file = file.is_some();
    if let Some(f) = file {
        loggers.push(WriteLogger::new(level, Config::default(), f));
    }
    match CombinedLogger::init(loggers) {
        Ok(()) if have_file => {
            info!("logging initialized, log file: {}", name);
            Some(name)
        }
        _ => None,
    }
}
