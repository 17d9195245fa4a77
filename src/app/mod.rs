//! 应用入口
//!
//! - `cli` - 命令行参数
//! - `bootstrap` - 配置加载与日志设置
//! - `runner` - 子命令执行

pub mod bootstrap;
pub mod cli;
pub mod runner;

pub use cli::{Cli, Command};
pub use runner::run;
