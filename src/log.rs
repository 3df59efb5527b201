use log::{LevelFilter, info};
use std::time::Duration;

/// Environment variable that overrides the log filter, e.g. `MINTFLOW_LOG=debug`.
pub const LOG_ENV: &str = "MINTFLOW_LOG";

pub fn level_for(verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

pub fn init_logging(verbose: bool, quiet: bool) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level_for(verbose, quiet))
        .format_timestamp(None)
        .format_target(false)
        .parse_env(LOG_ENV);
    // a second initialisation (tests) keeps the first logger
    let _ = builder.try_init();
}

pub fn show_greeting(step: &str) {
    info!("=== mintflow {} ===", step);
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    info!(
        "=== Step completed in {:.2}s ===",
        elapsed.as_secs_f64()
    );
}
