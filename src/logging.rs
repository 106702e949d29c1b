use crate::config::Settings;
use chrono::Local;
use log::LevelFilter;
use std::io::Write;

/// Build the logger for `level`.
///
/// Lines look like `18-Oct-26 06:51:02 - dog_cli::process - INFO     - Saving...`.
pub fn build(level: LevelFilter) -> env_logger::Logger {
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {:<8} - {:<8} - {}",
                Local::now().format("%d-%b-%y %H:%M:%S"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .build()
}

/// Install the logger described by `settings` as the process logger.
pub fn init(settings: &Settings) -> Result<(), log::SetLoggerError> {
    let logger = build(settings.log_level);
    let max_level = logger.filter();

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}
