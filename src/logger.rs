//! 日志初始化
//!
//! `tracing-subscriber` 输出到 stderr 或日志文件；
//! 设置 `TERMBRIDGE_LOG` 时以其作为完整的过滤规则。

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{expand_tilde, LoggingConfig};

/// 覆盖过滤规则的环境变量
pub const LOG_FILTER_ENV: &str = "TERMBRIDGE_LOG";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as ValueEnum>::from_str(s, true)
            .map_err(|_| InitError::Configure(format!("unknown log level: {s}")))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// 由配置文件中的日志段构建
    pub fn from_config(config: &LoggingConfig) -> Result<Self, InitError> {
        Ok(Self {
            level: config.level.parse()?,
            file: config.file.as_deref().map(expand_tilde),
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// 初始化全局日志，重复调用时直接返回
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if INIT.get().is_some() {
        return Ok(());
    }

    inner_init(config)?;
    INIT.set(()).ok();
    Ok(())
}

fn inner_init(config: &LogConfig) -> Result<(), InitError> {
    let env_filter = build_env_filter(config.level.to_filter());

    let (writer, guard) = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_target(config.level >= LogLevel::Debug)
        .with_thread_ids(config.level >= LogLevel::Trace)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;

    let _ = GUARD.set(Some(guard));
    Ok(())
}

fn build_env_filter(level: LevelFilter) -> EnvFilter {
    if let Ok(filter) = std::env::var(LOG_FILTER_ENV) {
        return EnvFilter::new(filter);
    }
    EnvFilter::new(default_filter_for(level))
}

const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "tokio_tungstenite", "tungstenite", "mio"];

/// debug / trace 只放开本 crate，依赖库保持 info
fn default_filter_for(level: LevelFilter) -> String {
    let crate_level = match level {
        LevelFilter::TRACE => "trace",
        LevelFilter::DEBUG => "debug",
        LevelFilter::INFO => return "info".to_string(),
        LevelFilter::WARN => return "warn".to_string(),
        LevelFilter::ERROR => return "error".to_string(),
        LevelFilter::OFF => return "off".to_string(),
    };
    let mut filter = format!("info,termbridge={crate_level},termbridge_lib={crate_level}");
    for target in NOISY_TARGETS {
        filter.push(',');
        filter.push_str(target);
        filter.push_str("=info");
    }
    filter
}
