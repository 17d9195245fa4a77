//! 会话驱动任务
//!
//! 在单个 tokio 任务中串行处理用户命令与会话事件，
//! 会话本身因此不需要任何锁。

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::events::SessionState;
use super::geometry::Geometry;
use super::session::TerminalSession;
use super::transport::EventReceiver;

/// 用户命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Open,
    Close,
    SetViewport(Geometry),
    Shutdown,
}

/// 发布的会话状态
///
/// `epoch` 每次 `open()` 递增，可区分两次连续的 `Closed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub epoch: u64,
}

/// 会话句柄
///
/// 命令是非阻塞的；状态通过 `watch` 通道发布，用作连接指示。
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn open(&self) {
        let _ = self.commands.send(SessionCommand::Open);
    }

    pub fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close);
    }

    pub fn set_viewport(&self, geometry: Geometry) {
        let _ = self.commands.send(SessionCommand::SetViewport(geometry));
    }

    /// 当前状态
    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// 当前会话实例的纪元
    pub fn epoch(&self) -> u64 {
        self.status.borrow().epoch
    }

    /// 订阅状态变化
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// 等待状态满足条件
    pub async fn wait_for<F>(&mut self, predicate: F) -> SessionState
    where
        F: Fn(SessionState) -> bool,
    {
        self.wait_until(|status| predicate(status.state)).await.state
    }

    /// 等待状态与纪元满足条件；驱动任务结束时返回最后的状态
    pub async fn wait_until<F>(&mut self, predicate: F) -> SessionStatus
    where
        F: Fn(SessionStatus) -> bool,
    {
        loop {
            let current = *self.status.borrow_and_update();
            if predicate(current) {
                return current;
            }
            if self.status.changed().await.is_err() {
                return *self.status.borrow();
            }
        }
    }

    /// 关闭会话并结束驱动任务
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("[终端] 会话任务异常退出: {}", e);
        }
    }
}

/// 启动会话驱动任务
pub fn spawn_session(session: TerminalSession, events: EventReceiver) -> SessionHandle {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (status_tx, status) = watch::channel(snapshot(&session));
    let task = tokio::spawn(run_session(session, events, command_rx, status_tx));
    SessionHandle {
        commands,
        status,
        task,
    }
}

async fn run_session(
    mut session: TerminalSession,
    mut events: EventReceiver,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    status: watch::Sender<SessionStatus>,
) {
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(SessionCommand::Open) => session.open(),
                Some(SessionCommand::Close) => session.close(),
                Some(SessionCommand::SetViewport(geometry)) => session.set_viewport(geometry),
                Some(SessionCommand::Shutdown) | None => {
                    session.close();
                    publish(&status, snapshot(&session));
                    break;
                }
            },
            Some((epoch, event)) = events.recv() => session.handle(epoch, event),
        }
        publish(&status, snapshot(&session));
    }
    tracing::debug!("[终端] 会话驱动任务已退出");
}

fn snapshot(session: &TerminalSession) -> SessionStatus {
    SessionStatus {
        state: session.state(),
        epoch: session.epoch(),
    }
}

fn publish(status: &watch::Sender<SessionStatus>, next: SessionStatus) {
    status.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}
