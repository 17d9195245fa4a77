//! 应用启动引导模块
//!
//! 包含配置加载、命令行覆盖与日志配置等启动逻辑。

use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::logger::LogConfig;

use super::cli::{Cli, Command};

/// 启动错误
#[derive(Debug)]
pub enum StartupError {
    LoadFailed(String),
    Invalid(String),
    Logging(String),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::LoadFailed(e) => write!(f, "配置加载失败: {}", e),
            StartupError::Invalid(e) => write!(f, "配置无效: {}", e),
            StartupError::Logging(e) => write!(f, "日志初始化失败: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

/// 加载配置文件并应用命令行覆盖，最后校验
pub fn load_and_validate_config(cli: &Cli) -> Result<Config, StartupError> {
    let mut config = load_config_from(&config_path(cli))?;
    apply_overrides(&mut config, &cli.command);
    config
        .validate()
        .map_err(|e| StartupError::Invalid(e.to_string()))?;
    Ok(config)
}

/// `--config` 指定的路径，否则为默认路径
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(config::default_config_path)
}

fn load_config_from(path: &Path) -> Result<Config, StartupError> {
    config::load_config(path).map_err(|e| StartupError::LoadFailed(e.to_string()))
}

/// 命令行参数优先于配置文件
pub fn apply_overrides(config: &mut Config, command: &Command) {
    match command {
        Command::Serve(args) => {
            if let Some(host) = &args.host {
                config.server.host = host.clone();
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            if let Some(shell) = &args.shell {
                config.terminal.shell = Some(shell.clone());
            }
        }
        Command::Connect(args) => {
            if let Some(url) = &args.url {
                config.client.server_url = url.clone();
            }
        }
        Command::Config(_) => {}
    }
}

/// 客户端默认日志文件（stderr 即渲染中的终端）
pub fn default_client_log_path() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termbridge")
        .join("connect.log")
}

/// 合并配置文件与命令行的日志设置
pub fn log_config(config: &Config, cli: &Cli) -> Result<LogConfig, StartupError> {
    let mut log = LogConfig::from_config(&config.logging)
        .map_err(|e| StartupError::Logging(e.to_string()))?;
    if let Some(level) = cli.logging.level {
        log.level = level;
    }
    if let Some(file) = &cli.logging.file {
        log.file = Some(file.clone());
    }
    if log.file.is_none() && matches!(cli.command, Command::Connect(_)) {
        log.file = Some(default_client_log_path());
    }
    Ok(log)
}
