use crate::config::LOG_LEVEL;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use std::env;

// 带颜色输出到标准错误的简单日志后端。
struct Logger;

static LOGGER: Logger = Logger;

/// 初始化日志系统，重复初始化时静默忽略。
pub fn init() {
    try_init().ok();
}

/// 初始化日志系统。日志级别取自环境变量 `LOG_LEVEL`，默认 `INFO`。
pub fn try_init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level_from_env());
    Ok(())
}

fn level_from_env() -> LevelFilter {
    let log_level = env::var(LOG_LEVEL).unwrap_or_else(|_| String::from("INFO"));
    parse_level(&log_level)
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_uppercase().as_str() {
        "OFF" => LevelFilter::Off,
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "INFO" => LevelFilter::Info,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

impl Logger {
    /// 日志级别对应的 ANSI 颜色，可以通过 `LOG_COLOR_<LEVEL>` 覆盖。
    fn color_for_level(level: Level) -> u8 {
        let (key, default) = match level {
            Level::Error => ("LOG_COLOR_ERROR", 31),
            Level::Warn => ("LOG_COLOR_WARN", 93),
            Level::Info => ("LOG_COLOR_INFO", 34),
            Level::Debug => ("LOG_COLOR_DEBUG", 32),
            Level::Trace => ("LOG_COLOR_TRACE", 90),
        };
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let color = Logger::color_for_level(record.level());

        eprintln!(
            "\u{1B}[{}m[{:>5}]: {} - {}\u{1B}[0m",
            color,
            record.level(),
            record.target(),
            record.args(),
        );
    }

    fn flush(&self) {}
}
