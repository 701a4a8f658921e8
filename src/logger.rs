//! 统一日志记录模块
//!
//! 库代码只通过 `log` 宏输出，这里负责一次性安装 `env_logger` 后端。

use std::sync::Once;

static INIT: Once = Once::new();

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 日志级别
    pub level: log::LevelFilter,
    /// 是否显示时间戳
    pub show_timestamp: bool,
    /// 是否显示模块路径
    pub show_target: bool,
    /// 日志格式
    pub format: LogFormat,
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 简洁格式（带颜色）
    Compact,
    /// JSON格式，每行一个对象
    Json,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: log::LevelFilter::Info,
            show_timestamp: true,
            show_target: false,
            format: LogFormat::Compact,
        }
    }
}

impl LoggerConfig {
    /// 命令行使用的配置：`verbose` 打开调试日志，`json` 切换为 JSON 行
    pub fn for_cli(verbose: bool, json: bool) -> Self {
        Self {
            level: if verbose {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
            show_target: verbose,
            format: if json { LogFormat::Json } else { LogFormat::Compact },
            ..Default::default()
        }
    }
}

/// 初始化日志系统
///
/// # Arguments
///
/// * `config` - 日志配置，如果为None则使用默认配置
///
/// # Examples
///
/// ```
/// use hopchain::logger::{init_logger, LoggerConfig};
///
/// init_logger(Some(LoggerConfig {
///     level: log::LevelFilter::Debug,
///     ..Default::default()
/// }));
///
/// // 重复初始化会被忽略
/// init_logger(None);
/// ```
pub fn init_logger(config: Option<LoggerConfig>) {
    INIT.call_once(|| {
        let config = config.unwrap_or_default();

        let mut builder = env_logger::Builder::from_default_env();
        builder.filter_level(config.level);

        match config.format {
            LogFormat::Compact => {
                builder.format(move |buf, record| {
                    use std::io::Write;

                    let level_style = match record.level() {
                        log::Level::Error => "\x1b[31m", // 红色
                        log::Level::Warn => "\x1b[33m",  // 黄色
                        log::Level::Info => "\x1b[32m",  // 绿色
                        log::Level::Debug => "\x1b[36m", // 青色
                        log::Level::Trace => "\x1b[37m", // 白色
                    };
                    let reset = "\x1b[0m";

                    let mut line = String::new();
                    if config.show_timestamp {
                        line.push_str(&format!("[{}] ", chrono::Local::now().format("%H:%M:%S")));
                    }
                    line.push_str(&format!("{}{:5}{} ", level_style, record.level(), reset));
                    if config.show_target {
                        line.push_str(&format!("[{}] ", record.target()));
                    }

                    writeln!(buf, "{}{}", line, record.args())
                });
            }
            LogFormat::Json => {
                builder.format(move |buf, record| {
                    use std::io::Write;

                    let log_entry = serde_json::json!({
                        "timestamp": chrono::Local::now().to_rfc3339(),
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "message": record.args().to_string(),
                    });

                    writeln!(buf, "{}", log_entry)
                });
            }
        }

        // 已安装过其他后端时忽略
        let _ = builder.try_init();
    });
}
