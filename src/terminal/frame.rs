//! 帧编解码
//!
//! 复用传输层自身的消息类型作为帧边界：
//! - 文本消息 = JSON 控制帧，例如 `{"type":"resize","cols":80,"rows":24}`
//! - 二进制消息 = 原始终端字节，不做任何转义或封装
//!
//! 入站文本消息解析失败时直接丢弃，不会作为数据写入模拟器。
//! 旧版服务端的 `{"error":"..."}`（无 `type` 字段）按错误控制帧处理。

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 传输边界上的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// 文本消息（UTF-8 JSON）
    Text(String),
    /// 二进制消息
    Binary(Bytes),
}

/// 控制帧
///
/// 新的控制消息以新的 `type` 标签扩展，不新增传输通道。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// 声明 PTY 应使用的尺寸（客户端 → 服务端）
    Resize { cols: u16, rows: u16 },
    /// 服务端无法提供会话时的错误说明（服务端 → 客户端）
    Error { message: String },
}

/// 旧版服务端的错误消息
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BareError {
    error: String,
}

/// 解码后的入站帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Control(ControlFrame),
    Data(Bytes),
}

/// 编码控制帧为文本消息
pub fn encode_control(frame: &ControlFrame) -> WireMessage {
    // 只包含整数与字符串字段，序列化不会失败
    let text = serde_json::to_string(frame).unwrap_or_default();
    WireMessage::Text(text)
}

/// 编码数据帧为二进制消息
pub fn encode_data(data: impl Into<Bytes>) -> WireMessage {
    WireMessage::Binary(data.into())
}

/// 按消息类型分派入站消息
///
/// 文本消息无法解析为控制帧时返回 `None`。
pub fn decode(message: WireMessage) -> Option<InboundFrame> {
    match message {
        WireMessage::Binary(data) => Some(InboundFrame::Data(data)),
        WireMessage::Text(text) => match serde_json::from_str::<ControlFrame>(&text) {
            Ok(frame) => Some(InboundFrame::Control(frame)),
            Err(e) => match serde_json::from_str::<BareError>(&text) {
                Ok(bare) => Some(InboundFrame::Control(ControlFrame::Error {
                    message: bare.error,
                })),
                Err(_) => {
                    tracing::debug!("[终端] 丢弃无法解析的控制消息: {} ({})", text, e);
                    None
                }
            },
        },
    }
}
