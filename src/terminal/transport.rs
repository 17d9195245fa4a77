//! 传输与事件接口
//!
//! 会话控制器对两个相互独立的异步事件源作出反应：
//! 本地模拟器（按键、尺寸变化）与远端传输（建立、消息、关闭）。
//! 两者都通过 `EventSink` 把事件投递到同一个通道，事件带有会话纪元（epoch），
//! 旧纪元的事件在重新打开后会被丢弃。

use bytes::Bytes;
use tokio::sync::mpsc;

use super::error::TerminalError;
use super::frame::WireMessage;
use super::geometry::Geometry;

/// 会话事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 传输已建立
    TransportEstablished,
    /// 收到传输消息
    TransportMessage(WireMessage),
    /// 传输已关闭（远端关闭、错误、网络中断）
    TransportClosed { reason: Option<String> },
    /// 模拟器产生的按键/粘贴字节
    Input(Bytes),
    /// 模拟器报告的视口尺寸
    Resized { cols: u16, rows: u16 },
    /// 模拟器可以继续接收输出
    OutputDrained,
}

/// 带纪元的事件
pub type TaggedEvent = (u64, SessionEvent);

/// 事件接收端
pub type EventReceiver = mpsc::UnboundedReceiver<TaggedEvent>;

/// 事件投递句柄
///
/// 发送是非阻塞的；会话已销毁时静默丢弃。
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send((self.epoch, event));
    }

    pub fn established(&self) {
        self.emit(SessionEvent::TransportEstablished);
    }

    pub fn message(&self, message: WireMessage) {
        self.emit(SessionEvent::TransportMessage(message));
    }

    pub fn closed(&self, reason: Option<String>) {
        self.emit(SessionEvent::TransportClosed { reason });
    }

    pub fn input(&self, data: impl Into<Bytes>) {
        self.emit(SessionEvent::Input(data.into()));
    }

    pub fn resized(&self, geometry: Geometry) {
        self.emit(SessionEvent::Resized {
            cols: geometry.cols(),
            rows: geometry.rows(),
        });
    }

    pub fn drained(&self) {
        self.emit(SessionEvent::OutputDrained);
    }

    /// 会话是否已不再接收事件
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 全双工传输
///
/// `send` 只负责排队，不等待对端确认。
pub trait Transport: Send {
    /// 排队发送一条消息
    fn send(&mut self, message: WireMessage) -> Result<(), TerminalError>;

    /// 请求优雅关闭，可重复调用
    fn close(&mut self);
}

/// 传输工厂
///
/// 每次 `open()` 都会调用一次 `connect`，返回的传输处于连接中状态，
/// 建立成功或失败通过 `sink` 异步报告。
pub trait Connector: Send + Sync {
    fn connect(&self, sink: EventSink) -> Result<Box<dyn Transport>, TerminalError>;
}
