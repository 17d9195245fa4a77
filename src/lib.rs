//! termbridge - 交互式终端会话桥接
//!
//! 通过单条 WebSocket 连接驱动远端 PTY 中的交互式 Shell：
//! 文本消息承载 JSON 控制帧，二进制消息承载原始字节。

pub mod app;
pub mod config;
pub mod logger;
pub mod server;
pub mod terminal;

pub use config::Config;
pub use terminal::{spawn_session, SessionHandle, SessionState, TerminalSession};
