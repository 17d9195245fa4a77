//! 配置文件读写
//!
//! 配置文件缺失或为空时使用默认值；写入前保留一份 `.yaml.backup`。

use super::types::Config;
use std::path::{Path, PathBuf};

/// 配置错误类型
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// 文件读取错误
    ReadError(String),
    /// 文件写入错误
    WriteError(String),
    /// YAML 解析错误
    ParseError(String),
    /// YAML 序列化错误
    SerializeError(String),
    /// 配置验证错误
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(msg) => write!(f, "配置读取错误: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "配置写入错误: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "YAML 解析错误: {}", msg),
            ConfigError::SerializeError(msg) => write!(f, "YAML 序列化错误: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "配置验证错误: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// `<config dir>/termbridge/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termbridge")
        .join("config.yaml")
}

/// 读取配置文件，文件不存在时返回默认配置
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!("[CONFIG] 配置文件不存在，使用默认配置: {:?}", path);
        return Ok(Config::default());
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
    let config = parse_yaml(&content)?;
    tracing::debug!("[CONFIG] 已加载配置: {:?}", path);
    Ok(config)
}

/// 解析 YAML，空内容视为默认配置
pub fn parse_yaml(yaml: &str) -> Result<Config, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
}

pub fn to_yaml(config: &Config) -> Result<String, ConfigError> {
    serde_yaml::to_string(config).map_err(|e| ConfigError::SerializeError(e.to_string()))
}

/// 写入配置文件
///
/// 自动创建父目录；已有文件先复制为 `<name>.yaml.backup`。
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let yaml = to_yaml(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
    }
    if path.exists() {
        let backup = path.with_extension("yaml.backup");
        if let Err(e) = std::fs::copy(path, &backup) {
            tracing::warn!("[CONFIG] 备份配置失败 {:?}: {}", backup, e);
        }
    }
    std::fs::write(path, yaml).map_err(|e| ConfigError::WriteError(e.to_string()))?;
    tracing::info!("[CONFIG] 已写入配置: {:?}", path);
    Ok(())
}
