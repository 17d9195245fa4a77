//! 终端桥接核心模块
//!
//! 让用户通过单条全双工连接驱动远端的交互式 Shell。
//!
//! ## 模块结构
//! - `error` - 错误类型定义
//! - `events` - 会话状态定义
//! - `frame` - 帧编解码（文本 = 控制帧，二进制 = 数据帧）
//! - `geometry` - 终端尺寸与尺寸同步
//! - `pump` - 输入输出泵
//! - `transport` - 传输与事件接口
//! - `emulator` - 模拟器接口与外观配置
//! - `session` - 会话控制器
//! - `driver` - 会话驱动任务
//! - `ws_transport` - WebSocket 传输
//! - `local` - 基于宿主终端的模拟器
//!
//! ## 使用示例
//! ```ignore
//! use termbridge_lib::terminal::{spawn_session, TerminalSession, WsConnector, LocalTerminal};
//!
//! let (local, _input) = LocalTerminal::start();
//! let connector = Arc::new(WsConnector::new("ws://127.0.0.1:3010/api/terminal/ws")?);
//! let (session, events) = TerminalSession::new(connector, Arc::new(local.clone()), config, local.viewport());
//! let handle = spawn_session(session, events);
//! handle.open();
//! ```

pub mod driver;
pub mod emulator;
pub mod error;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod local;
pub mod pump;
pub mod session;
pub mod transport;
pub mod ws_transport;

#[cfg(test)]
mod tests;

// 重新导出常用类型
pub use driver::{spawn_session, SessionHandle, SessionStatus};
pub use emulator::{Emulator, EmulatorConfig, EmulatorFactory, TerminalTheme};
pub use error::TerminalError;
pub use events::{PtyStatus, SessionState};
pub use frame::{ControlFrame, InboundFrame, WireMessage};
pub use geometry::{Geometry, GeometrySync, DEFAULT_COLS, DEFAULT_ROWS};
pub use local::{LocalInput, LocalTerminal};
pub use session::{TerminalSession, SESSION_ENDED_TRAILER};
pub use transport::{Connector, EventReceiver, EventSink, SessionEvent, Transport};
pub use ws_transport::{terminal_ws_url, WsConnector, DEFAULT_WS_PATH};
