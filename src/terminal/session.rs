//! 终端会话控制器
//!
//! 管理单个终端视图的生命周期：打开、连接、拆除、重新打开。
//!
//! ## 状态机
//! ```text
//! Idle --open()--> Connecting --传输建立--> Connected
//! Connected --传输关闭/错误--> Closed（追加提示信息）
//! Connected --close()--> Closed（静默）
//! Connecting --close()--> Closed
//! Closed --open()--> Connecting（新的会话实例）
//! ```
//!
//! 每次 `open()` 递增纪元（epoch），传输、模拟器与缓冲都属于该纪元；
//! 旧纪元的事件一律丢弃，重新打开不会继承任何旧数据。
//!
//! 远端关闭时模拟器若仍有未写完的输出，会话先进入 `Closed`，
//! 模拟器留在排空槽中，等剩余输出与提示信息全部写入后再释放。

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::emulator::{Emulator, EmulatorConfig, EmulatorFactory};
use super::error::TerminalError;
use super::events::SessionState;
use super::frame::{decode, encode_control, ControlFrame, InboundFrame, WireMessage};
use super::geometry::{Geometry, GeometrySync};
use super::pump::IoPump;
use super::transport::{
    Connector, EventReceiver, EventSink, SessionEvent, TaggedEvent, Transport,
};

/// 传输关闭后追加到终端输出的提示
pub const SESSION_ENDED_TRAILER: &str =
    "\r\n\x1b[90m[session ended — reopen terminal to reconnect]\x1b[0m\r\n";

/// 终端会话
pub struct TerminalSession {
    state: SessionState,
    epoch: u64,
    transport: Option<Box<dyn Transport>>,
    emulator: Option<Box<dyn Emulator>>,
    /// 已结束、仍在写出剩余输出的模拟器
    draining: Option<Box<dyn Emulator>>,
    geometry: GeometrySync,
    pump: IoPump,
    connector: Arc<dyn Connector>,
    emulators: Arc<dyn EmulatorFactory>,
    config: Arc<EmulatorConfig>,
    events: mpsc::UnboundedSender<TaggedEvent>,
}

impl TerminalSession {
    /// 创建会话，返回会话与其事件接收端
    ///
    /// `viewport` 为当前视口尺寸，用于构造第一个模拟器。
    pub fn new(
        connector: Arc<dyn Connector>,
        emulators: Arc<dyn EmulatorFactory>,
        config: Arc<EmulatorConfig>,
        viewport: Geometry,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            state: SessionState::Idle,
            epoch: 0,
            transport: None,
            emulator: None,
            draining: None,
            geometry: GeometrySync::new(viewport),
            pump: IoPump::new(),
            connector,
            emulators,
            config,
            events,
        };
        (session, receiver)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 当前会话实例的纪元
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// 最近一次观察到的视口尺寸
    pub fn geometry(&self) -> Geometry {
        self.geometry.current()
    }

    /// 打开会话
    ///
    /// 已处于 `Connecting` / `Connected` 时不做任何事。
    pub fn open(&mut self) {
        if self.state.is_live() {
            tracing::debug!("[终端] 会话 #{} 已打开，忽略重复 open", self.epoch);
            return;
        }

        self.discard_draining();
        self.epoch += 1;
        self.pump.reset();
        self.geometry.reset();
        self.state = SessionState::Connecting;
        tracing::info!("[终端] 打开会话 #{}", self.epoch);

        let sink = EventSink::new(self.epoch, self.events.clone());
        let emulator = self
            .emulators
            .create(&self.config, self.geometry.current(), sink.clone());
        self.geometry.observe(emulator.geometry());
        self.emulator = Some(emulator);

        match self.connector.connect(sink) {
            Ok(transport) => self.transport = Some(transport),
            Err(e) => {
                tracing::warn!("[终端] 会话 #{} 连接失败: {}", self.epoch, e);
                self.end_session(Some(e.to_string()));
            }
        }
    }

    /// 关闭会话
    ///
    /// 任意状态下都可重复调用，不等待在途帧。
    pub fn close(&mut self) {
        if self.state.is_live() {
            tracing::info!("[终端] 关闭会话 #{}", self.epoch);
        }
        self.teardown();
        self.discard_draining();
        self.state = SessionState::Closed;
    }

    /// 更新视口尺寸
    ///
    /// 未连接时只记录，不发送；下次连接握手时使用最新尺寸。
    pub fn set_viewport(&mut self, geometry: Geometry) {
        if self.state.is_live() {
            self.on_resize(geometry);
        } else {
            self.geometry.observe(geometry);
        }
    }

    /// 处理一个事件
    pub fn handle(&mut self, epoch: u64, event: SessionEvent) {
        if epoch == self.epoch
            && self.draining.is_some()
            && matches!(event, SessionEvent::OutputDrained)
        {
            self.continue_draining();
            return;
        }
        if epoch != self.epoch || !self.state.is_live() {
            tracing::trace!(
                "[终端] 丢弃过期事件 (纪元 {}，当前 #{} {:?}): {:?}",
                epoch,
                self.epoch,
                self.state,
                event
            );
            return;
        }

        match event {
            SessionEvent::TransportEstablished => self.on_established(),
            SessionEvent::TransportMessage(message) => self.on_message(message),
            SessionEvent::TransportClosed { reason } => self.end_session(reason),
            SessionEvent::Input(data) => self.on_input(data),
            SessionEvent::Resized { cols, rows } => match Geometry::new(cols, rows) {
                Ok(geometry) => self.on_resize(geometry),
                Err(e) => tracing::debug!("[终端] 忽略尺寸报告: {}", e),
            },
            SessionEvent::OutputDrained => {
                if let Some(emulator) = self.emulator.as_mut() {
                    self.pump.flush_output(emulator.as_mut());
                }
            }
        }
    }

    fn on_established(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.state = SessionState::Connected;

        let geometry = self
            .emulator
            .as_ref()
            .map(|e| e.geometry())
            .unwrap_or_else(|| self.geometry.current());
        tracing::info!("[终端] 会话 #{} 已连接 ({})", self.epoch, geometry);

        let handshake = self.geometry.handshake(geometry);
        if let Err(e) = self.send_control(&handshake) {
            self.end_session(Some(e.to_string()));
            return;
        }

        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = self.pump.flush_input(transport.as_mut()) {
                self.end_session(Some(e.to_string()));
            }
        }
    }

    fn on_message(&mut self, message: WireMessage) {
        match decode(message) {
            Some(InboundFrame::Data(data)) => {
                if let Some(emulator) = self.emulator.as_mut() {
                    self.pump.deliver_output(emulator.as_mut(), data);
                }
            }
            Some(InboundFrame::Control(ControlFrame::Error { message })) => {
                tracing::warn!("[终端] 服务端错误: {}", message);
                let line = format!("\r\n\x1b[90m[terminal error: {}]\x1b[0m\r\n", message);
                if let Some(emulator) = self.emulator.as_mut() {
                    self.pump
                        .deliver_output(emulator.as_mut(), Bytes::from(line));
                }
            }
            Some(InboundFrame::Control(frame)) => {
                tracing::debug!("[终端] 忽略入站控制帧: {:?}", frame);
            }
            None => {}
        }
    }

    fn on_input(&mut self, data: Bytes) {
        match self.state {
            SessionState::Connecting => self.pump.queue_input(data),
            SessionState::Connected => {
                let Some(transport) = self.transport.as_mut() else {
                    return;
                };
                if let Err(e) = self.pump.send_input(transport.as_mut(), data) {
                    self.end_session(Some(e.to_string()));
                }
            }
            _ => {}
        }
    }

    fn on_resize(&mut self, geometry: Geometry) {
        if self.state != SessionState::Connected {
            self.geometry.observe(geometry);
            return;
        }
        if let Some(frame) = self.geometry.on_change(geometry) {
            tracing::debug!("[终端] 会话 #{} 调整大小为 {}", self.epoch, geometry);
            if let Err(e) = self.send_control(&frame) {
                self.end_session(Some(e.to_string()));
            }
        }
    }

    fn send_control(&mut self, frame: &ControlFrame) -> Result<(), TerminalError> {
        match self.transport.as_mut() {
            Some(transport) => transport.send(encode_control(frame)),
            None => Err(TerminalError::TransportClosed),
        }
    }

    /// 传输侧结束：拆除并追加提示
    fn end_session(&mut self, reason: Option<String>) {
        match &reason {
            Some(reason) => tracing::info!("[终端] 会话 #{} 已结束: {}", self.epoch, reason),
            None => tracing::info!("[终端] 会话 #{} 已结束", self.epoch),
        }

        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if let Some(mut emulator) = self.emulator.take() {
            self.pump.deliver_output(
                emulator.as_mut(),
                Bytes::from_static(SESSION_ENDED_TRAILER.as_bytes()),
            );
            if self.pump.pending_output_len() > 0 {
                tracing::debug!(
                    "[终端] 会话 #{} 仍有 {} 字节输出待写入",
                    self.epoch,
                    self.pump.pending_output_len()
                );
                self.pump.discard_input();
                self.draining = Some(emulator);
            } else {
                emulator.dispose();
            }
        }
        self.teardown();
        self.state = SessionState::Closed;
    }

    /// 模拟器报告可继续写入：写完剩余输出后释放
    fn continue_draining(&mut self) {
        let Some(emulator) = self.draining.as_mut() else {
            return;
        };
        if self.pump.flush_output(emulator.as_mut()) {
            if let Some(mut emulator) = self.draining.take() {
                emulator.dispose();
            }
            tracing::debug!("[终端] 会话 #{} 剩余输出已写完", self.epoch);
        }
    }

    /// 放弃排空中的模拟器及其剩余输出
    fn discard_draining(&mut self) {
        if let Some(mut emulator) = self.draining.take() {
            emulator.dispose();
        }
        self.pump.reset();
    }

    fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if let Some(mut emulator) = self.emulator.take() {
            emulator.dispose();
        }
        if self.draining.is_none() {
            self.pump.reset();
        }
        self.geometry.reset();
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.teardown();
        self.discard_draining();
    }
}
