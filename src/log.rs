use ::log::{Record, Level, Metadata, SetLoggerError};

/// Cible des logs émis par l'application.
pub const TARGET: &str = "nexoticket";

#[macro_use]
pub mod macros {
    #[doc(alias = "log::error")]
    #[macro_export]
    macro_rules! log_error {
        ($($arg:tt)*) => {
            ::log::error!(target: $crate::log::TARGET, $($arg)*)
        };
    }
    #[doc(alias = "log::warn")]
    #[macro_export]
    macro_rules! log_warn {
        ($($arg:tt)*) => {
            ::log::warn!(target: $crate::log::TARGET, $($arg)*)
        };
    }
    #[doc(alias = "log::info")]
    #[macro_export]
    macro_rules! log_info {
        ($($arg:tt)*) => {
            ::log::info!(target: $crate::log::TARGET, $($arg)*)
        };
    }
    #[doc(alias = "log::debug")]
    #[macro_export]
    macro_rules! log_debug {
        ($($arg:tt)*) => {
            ::log::debug!(target: $crate::log::TARGET, $($arg)*)
        };
    }
}

struct SimpleLogger {
    level: Level,
}

impl ::log::Log for SimpleLogger {
    #[inline]
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) && record.target() == TARGET {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            match record.level() {
                Level::Error | Level::Warn => eprintln!("[{} {}] {}", now, record.level(), record.args()),
                _ => println!("[{} {}] {}", now, record.level(), record.args()),
            }
        }
    }
    #[inline]
    fn flush(&self) {}
}

/// Convertit le niveau lu dans la configuration.
///
/// Les valeurs inconnues retombent sur `Info`.
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "error" => Level::Error,
        "warn" | "warning" => Level::Warn,
        "debug" => Level::Debug,
        "trace" => Level::Trace,
        _ => Level::Info,
    }
}

/// Installe le logger de l'application.
///
/// En debug tout est affiché, en release le niveau de la configuration s'applique.
pub fn init(level: &str) -> Result<(), SetLoggerError> {
    let level = if cfg!(debug_assertions) { Level::Trace } else { parse_level(level) };
    let logger = Box::new(SimpleLogger { level });
    ::log::set_boxed_logger(logger)
        .map(|_| ::log::set_max_level(level.to_level_filter()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(parse_level("WARN"), Level::Warn);
        assert_eq!(parse_level("debug"), Level::Debug);
        assert_eq!(parse_level("nimporte"), Level::Info);
    }
}
