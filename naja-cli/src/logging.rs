//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现按 target 过滤的日志控制。

use std::io;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};

/// Parse log level string
pub fn parse_log_level(s: &str) -> Option<LevelFilter> {
    match s.to_lowercase().as_str() {
        "silent" | "off" => Some(LevelFilter::OFF),
        "error" => Some(LevelFilter::ERROR),
        "warn" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        "trace" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

/// 使用指定级别初始化日志系统（默认 warn）
pub fn init(level: Option<LevelFilter>) {
    let level = level.unwrap_or(LevelFilter::WARN);
    let targets = Targets::new()
        .with_default(level)
        .with_target("naja_api", level)
        .with_target("najam", level);

    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .with_filter(targets);

    tracing_subscriber::registry().with(stderr_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("info"), Some(LevelFilter::INFO));
        assert_eq!(parse_log_level("SILENT"), Some(LevelFilter::OFF));
        assert_eq!(parse_log_level("loud"), None);
    }
}
