//! 终端状态定义
//!
//! ## 状态列表
//! - `SessionState` - 客户端会话控制器的生命周期状态
//! - `PtyStatus` - 服务端 PTY 会话状态

use serde::{Deserialize, Serialize};

/// 客户端会话状态
///
/// `Idle` 与 `Closed` 均可通过 `open()` 恢复；
/// 只有 `Connecting` / `Connected` 持有存活的传输与模拟器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// 尚未打开
    Idle,
    /// 正在连接
    Connecting,
    /// 已连接
    Connected,
    /// 已关闭
    Closed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionState {
    /// 是否持有存活的传输与模拟器
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// 服务端 PTY 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyStatus {
    /// 运行中
    Running,
    /// 已结束
    Done,
    /// 错误
    Error,
}

impl Default for PtyStatus {
    fn default() -> Self {
        Self::Running
    }
}
