use crate::config::LoggingConfig;
use anyhow::Result;
use time::{format_description::well_known::Rfc3339, UtcOffset};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const FILE_PREFIX: &str = "sauna_auth";

/// 初始化日志系统
///
/// - 同时输出到控制台和文件
/// - 文件按天滚动，只保留最近 `max_files` 个
/// - 时间戳使用配置的 UTC 偏移
pub fn init_logger(config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.dir)?;

    let timer = OffsetTime::new(utc_offset(config.utc_offset_hours)?, Rfc3339);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(config.max_files.max(1))
        .build(&config.dir)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sauna_auth=debug,tower_http=debug".into());

    // 文件中不使用颜色代码
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_timer(timer.clone())
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(())
}

fn utc_offset(hours: i8) -> Result<UtcOffset> {
    UtcOffset::from_hms(hours, 0, 0)
        .map_err(|e| anyhow::anyhow!("无效的日志时区偏移 {} 小时: {}", hours, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_offset_range() {
        assert_eq!(utc_offset(8).unwrap(), UtcOffset::from_hms(8, 0, 0).unwrap());
        assert!(utc_offset(0).is_ok());
        assert!(utc_offset(30).is_err());
    }

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.dir, "logs");
        assert_eq!(config.utc_offset_hours, 0);
        assert_eq!(config.max_files, 7);
    }
}
