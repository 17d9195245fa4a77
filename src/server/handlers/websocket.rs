//! 终端 WebSocket 处理器
//!
//! 每条连接对应一个新的 PTY 进程：
//! - 二进制消息 → PTY 标准输入
//! - 文本消息 → JSON 控制帧（`resize` 调整 PTY 大小，其余丢弃）
//! - PTY 输出 → 二进制消息；PTY 退出 → 关闭连接
//! - 连接关闭 → 结束 PTY 进程

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::server::pty_session::{PtyEvent, PtyHost};
use crate::server::AppState;
use crate::terminal::frame::{self, ControlFrame, InboundFrame, WireMessage};
use crate::terminal::{Geometry, PtyStatus};

/// 启动 Shell 失败时返回给客户端的信息
pub const SPAWN_FAILED_MESSAGE: &str = "failed to start terminal";

/// WebSocket 升级处理器
pub async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let client_info = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    ws.on_upgrade(move |socket| handle_terminal_socket(socket, state, client_info))
}

fn to_wire(message: WsMessage) -> Option<WireMessage> {
    match message {
        WsMessage::Text(text) => Some(WireMessage::Text(text)),
        WsMessage::Binary(data) => Some(WireMessage::Binary(Bytes::from(data))),
        _ => None,
    }
}

fn from_wire(message: WireMessage) -> WsMessage {
    match message {
        WireMessage::Text(text) => WsMessage::Text(text),
        WireMessage::Binary(data) => WsMessage::Binary(data.to_vec()),
    }
}

/// 处理单条终端连接
pub async fn handle_terminal_socket(
    mut socket: WebSocket,
    state: AppState,
    client_info: Option<String>,
) {
    let geometry = state.default_geometry;
    let session_id = state.registry.register(geometry, client_info.clone()).await;
    let short_id = session_id[..8].to_string();

    tracing::info!(
        "[WS] 新终端连接: {} (client: {:?})",
        short_id,
        client_info
    );

    let (pty_tx, mut pty_rx) = mpsc::unbounded_channel();
    let host = match state.hosts.spawn(&session_id, geometry, pty_tx) {
        Ok(host) => host,
        Err(e) => {
            tracing::error!("[WS] 连接 {} 启动终端失败: {}", short_id, e);
            let error = frame::encode_control(&ControlFrame::Error {
                message: SPAWN_FAILED_MESSAGE.to_string(),
            });
            let _ = socket.send(from_wire(error)).await;
            let _ = socket.close().await;
            let _ = state.registry.remove(&session_id).await;
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();

    // PTY → WebSocket，独立任务，慢客户端不影响输入读取
    let registry = state.registry.clone();
    let output_id = session_id.clone();
    let mut output_task = tokio::spawn(async move {
        while let Some(event) = pty_rx.recv().await {
            match event {
                PtyEvent::Output(data) => {
                    if sender.send(from_wire(frame::encode_data(data))).await.is_err() {
                        return;
                    }
                }
                PtyEvent::Exited { exit_code } => {
                    tracing::debug!("[WS] 会话 {} 进程退出 (code={:?})", output_id, exit_code);
                    let _ = registry.set_status(&output_id, PtyStatus::Done).await;
                    break;
                }
                PtyEvent::Failed(e) => {
                    tracing::warn!("[WS] 会话 {} 进程异常: {}", output_id, e);
                    let _ = registry.set_status(&output_id, PtyStatus::Error).await;
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    // WebSocket → PTY
    loop {
        tokio::select! {
            message = receiver.next() => match message {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(message)) => {
                    let Some(inbound) = to_wire(message).and_then(frame::decode) else {
                        continue;
                    };
                    apply_inbound(&state, &session_id, host.as_ref(), inbound).await;
                }
                Some(Err(e)) => {
                    tracing::debug!("[WS] 连接 {} 读取错误: {}", short_id, e);
                    break;
                }
            },
            _ = &mut output_task => break,
        }
    }

    host.close();
    output_task.abort();
    let _ = state.registry.remove(&session_id).await;
    tracing::info!("[WS] 终端连接已断开: {}", short_id);
}

async fn apply_inbound(state: &AppState, session_id: &str, host: &dyn PtyHost, inbound: InboundFrame) {
    match inbound {
        InboundFrame::Data(data) => {
            if let Err(e) = host.write(&data) {
                tracing::warn!("[WS] 会话 {} 写入失败: {}", session_id, e);
            }
        }
        InboundFrame::Control(ControlFrame::Resize { cols, rows }) => {
            let geometry = match Geometry::new(cols, rows) {
                Ok(geometry) => geometry,
                Err(e) => {
                    tracing::debug!("[WS] 会话 {} 忽略尺寸: {}", session_id, e);
                    return;
                }
            };
            match host.resize(geometry) {
                Ok(()) => {
                    let _ = state.registry.update_geometry(session_id, geometry).await;
                }
                Err(e) => tracing::warn!("[WS] 会话 {} {}", session_id, e),
            }
        }
        InboundFrame::Control(other) => {
            tracing::debug!("[WS] 会话 {} 忽略控制帧: {:?}", session_id, other);
        }
    }
}
