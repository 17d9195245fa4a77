//! 配置管理模块
//!
//! 提供 YAML 配置文件的加载、校验与保存

mod path_utils;
mod types;
mod yaml;

pub use path_utils::{collapse_tilde, expand_tilde};
pub use types::{ClientConfig, Config, LoggingConfig, ServerConfig, TerminalConfig};
pub use yaml::{default_config_path, load_config, parse_yaml, save_config, to_yaml, ConfigError};
