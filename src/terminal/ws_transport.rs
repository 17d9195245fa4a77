//! WebSocket 传输
//!
//! 基于 tokio-tungstenite 的客户端连接器。每次 `connect` 启动一个独立任务，
//! 任务内同时处理出站队列和入站消息，两个方向互不阻塞。

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::error::TerminalError;
use super::frame::WireMessage;
use super::transport::{Connector, EventSink, Transport};

/// 默认 WebSocket 路径
pub const DEFAULT_WS_PATH: &str = "/api/terminal/ws";

/// 由服务地址推导终端 WebSocket 地址
///
/// - `http://` → `ws://`，`https://` → `wss://`，路径替换为 `ws_path`
/// - `ws://` / `wss://` 路径为空时补上 `ws_path`，否则原样使用
pub fn terminal_ws_url(base: &str, ws_path: &str) -> Result<String, TerminalError> {
    let mut url = Url::parse(base).map_err(|e| TerminalError::InvalidUrl(format!("{base}: {e}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => {
            if url.path() == "/" || url.path().is_empty() {
                url.set_path(ws_path);
            }
            return Ok(url.to_string());
        }
        other => {
            return Err(TerminalError::InvalidUrl(format!(
                "不支持的协议 {other}: {base}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TerminalError::InvalidUrl(base.to_string()))?;
    url.set_path(ws_path);
    Ok(url.to_string())
}

/// WebSocket 连接器
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Result<Self, TerminalError> {
        let url = url.into();
        let parsed = Url::parse(&url).map_err(|e| TerminalError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TerminalError::InvalidUrl(url));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    fn connect(&self, sink: EventSink) -> Result<Box<dyn Transport>, TerminalError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TerminalError::Internal(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!("[WS] 连接 {} (纪元 {})", self.url, sink.epoch());
        runtime.spawn(run_socket(self.url.clone(), rx, sink));
        Ok(Box::new(WsTransport { tx, closed: false }))
    }
}

enum Outbound {
    Message(WireMessage),
    Close,
}

/// 单个连接的发送端
struct WsTransport {
    tx: mpsc::UnboundedSender<Outbound>,
    closed: bool,
}

impl Transport for WsTransport {
    fn send(&mut self, message: WireMessage) -> Result<(), TerminalError> {
        if self.closed {
            return Err(TerminalError::TransportClosed);
        }
        self.tx
            .send(Outbound::Message(message))
            .map_err(|_| TerminalError::TransportClosed)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(Outbound::Close);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_ws_message(message: WireMessage) -> Message {
    match message {
        WireMessage::Text(text) => Message::Text(text),
        WireMessage::Binary(data) => Message::Binary(data.to_vec()),
    }
}

async fn run_socket(url: String, mut outbound: mpsc::UnboundedReceiver<Outbound>, sink: EventSink) {
    // 连接完成前 close() 会直接放弃本次连接
    let mut early = Vec::new();
    let connect = connect_async(url.as_str());
    tokio::pin!(connect);
    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((stream, _)) => break stream,
                Err(e) => {
                    tracing::warn!("[WS] 连接 {} 失败: {}", url, e);
                    let error = TerminalError::TransportConnectFailed(e.to_string());
                    sink.closed(Some(error.to_string()));
                    return;
                }
            },
            item = outbound.recv() => match item {
                Some(Outbound::Message(message)) => early.push(message),
                Some(Outbound::Close) | None => {
                    tracing::debug!("[WS] 连接建立前已关闭 (纪元 {})", sink.epoch());
                    return;
                }
            },
        }
    };

    tracing::info!("[WS] 已连接 {}", url);
    sink.established();

    let (mut writer, mut reader) = stream.split();
    for message in early {
        if let Err(e) = writer.send(to_ws_message(message)).await {
            sink.closed(Some(e.to_string()));
            return;
        }
    }

    loop {
        tokio::select! {
            item = outbound.recv() => match item {
                Some(Outbound::Message(message)) => {
                    if let Err(e) = writer.send(to_ws_message(message)).await {
                        tracing::debug!("[WS] 发送失败: {}", e);
                        sink.closed(Some(e.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = writer.send(Message::Close(None)).await;
                    let _ = writer.close().await;
                    tracing::debug!("[WS] 已主动关闭 {}", url);
                    return;
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Binary(data))) => sink.message(WireMessage::Binary(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => sink.message(WireMessage::Text(text)),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                    tracing::info!("[WS] 远端关闭连接 {}", url);
                    sink.closed(reason);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("[WS] 读取错误: {}", e);
                    sink.closed(Some(e.to_string()));
                    return;
                }
                None => {
                    sink.closed(None);
                    return;
                }
            },
        }
    }
}
