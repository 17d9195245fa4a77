//! 配置类型定义
//!
//! 所有字段都带默认值，缺失的字段按默认值补齐。

use serde::{Deserialize, Serialize};

use super::yaml::ConfigError;
use crate::terminal::emulator::{parse_hex_color, EmulatorConfig};
use crate::terminal::ws_transport::DEFAULT_WS_PATH;
use crate::terminal::{DEFAULT_COLS, DEFAULT_ROWS};

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 客户端配置
    #[serde(default)]
    pub client: ClientConfig,
    /// 终端（PTY）配置
    #[serde(default)]
    pub terminal: TerminalConfig,
    /// 模拟器外观配置
    #[serde(default)]
    pub emulator: EmulatorConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 终端 WebSocket 路径
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3010
}

fn default_ws_path() -> String {
    DEFAULT_WS_PATH.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
        }
    }
}

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// 服务地址（http/https/ws/wss）
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

fn default_server_url() -> String {
    format!("http://{}:{}", default_host(), default_port())
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
        }
    }
}

/// 终端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalConfig {
    /// Shell 路径，未设置时使用 `$SHELL`，再回退到 `/bin/sh`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// 子进程的 TERM 环境变量
    #[serde(default = "default_term")]
    pub term: String,
    /// PTY 初始列数（客户端握手前使用）
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// PTY 初始行数
    #[serde(default = "default_rows")]
    pub rows: u16,
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

fn default_cols() -> u16 {
    DEFAULT_COLS
}

fn default_rows() -> u16 {
    DEFAULT_ROWS
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            term: default_term(),
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

impl TerminalConfig {
    /// 实际使用的 Shell
    pub fn resolve_shell(&self) -> String {
        self.shell
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// 日志级别（error / warn / info / debug / trace）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 日志文件路径，支持 ~ 展开；未设置时输出到 stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl Config {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError("server.port 不能为 0".to_string()));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "server.ws_path 必须以 / 开头: {}",
                self.server.ws_path
            )));
        }
        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            return Err(ConfigError::ValidationError(format!(
                "terminal 尺寸无效: {}x{}",
                self.terminal.cols, self.terminal.rows
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "未知的日志级别: {}",
                self.logging.level
            )));
        }
        if let Some(bad) = self
            .emulator
            .theme
            .colors()
            .find(|c| parse_hex_color(c).is_none())
        {
            return Err(ConfigError::ValidationError(format!("无效的颜色值: {}", bad)));
        }
        Ok(())
    }
}
