//! 终端模块错误类型
//!
//! 定义终端桥接相关的错误类型。
//!
//! ## 功能
//! - 传输层错误
//! - PTY 操作错误

use thiserror::Error;

/// 终端错误类型
#[derive(Debug, Error)]
pub enum TerminalError {
    /// 传输建立失败
    #[error("传输连接失败: {0}")]
    TransportConnectFailed(String),

    /// 传输已关闭
    #[error("传输已关闭")]
    TransportClosed,

    /// 终端尺寸无效
    #[error("终端尺寸无效: {cols}x{rows}")]
    InvalidGeometry { cols: u16, rows: u16 },

    /// 连接地址无效
    #[error("连接地址无效: {0}")]
    InvalidUrl(String),

    /// 会话不存在
    #[error("会话不存在: {0}")]
    SessionNotFound(String),

    /// PTY 创建失败
    #[error("PTY 创建失败: {0}")]
    PtyCreationFailed(String),

    /// 写入失败
    #[error("写入失败: {0}")]
    WriteFailed(String),

    /// 调整大小失败
    #[error("调整大小失败: {0}")]
    ResizeFailed(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}
