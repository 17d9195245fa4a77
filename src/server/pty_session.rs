//! PTY 会话封装
//!
//! 封装单个 PTY 进程，处理输入输出和生命周期管理。
//!
//! ## 功能
//! - 创建 PTY 子进程（使用连接时的默认大小，客户端握手后通过 resize 同步实际大小）
//! - 在独立线程中读取 PTY 输出并通过通道推送
//! - 输入经通道交给独立的写入线程，Shell 不读取标准输入时也不阻塞调用方
//! - 处理 PTY 大小调整
//! - 关闭时结束子进程，并在读取线程中回收

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

use crate::config::TerminalConfig;
use crate::terminal::{Geometry, PtyStatus, TerminalError};

/// PTY 读取缓冲区大小
const READ_BUFFER_SIZE: usize = 4096;

/// PTY 事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    /// 进程输出
    Output(Bytes),
    /// 进程已退出
    Exited { exit_code: Option<u32> },
    /// 读取失败
    Failed(String),
}

/// 运行中的 PTY 进程
pub trait PtyHost: Send + Sync {
    /// 写入按键字节，不阻塞
    fn write(&self, data: &[u8]) -> Result<(), TerminalError>;

    /// 调整窗口大小
    fn resize(&self, geometry: Geometry) -> Result<(), TerminalError>;

    /// 结束进程，可重复调用
    fn close(&self);

    /// 当前状态
    fn status(&self) -> PtyStatus;
}

/// PTY 进程工厂
pub trait PtyHostFactory: Send + Sync {
    fn spawn(
        &self,
        id: &str,
        geometry: Geometry,
        events: mpsc::UnboundedSender<PtyEvent>,
    ) -> Result<Box<dyn PtyHost>, TerminalError>;
}

/// 基于 portable-pty 的本机 PTY 工厂
#[derive(Debug, Clone)]
pub struct NativePtyFactory {
    config: TerminalConfig,
}

impl NativePtyFactory {
    pub fn new(config: TerminalConfig) -> Self {
        Self { config }
    }
}

impl PtyHostFactory for NativePtyFactory {
    fn spawn(
        &self,
        id: &str,
        geometry: Geometry,
        events: mpsc::UnboundedSender<PtyEvent>,
    ) -> Result<Box<dyn PtyHost>, TerminalError> {
        let session = PtySession::spawn(id.to_string(), &self.config, geometry, events)?;
        Ok(Box::new(session))
    }
}

fn pty_size(geometry: Geometry) -> PtySize {
    PtySize {
        rows: geometry.rows(),
        cols: geometry.cols(),
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// PTY 会话
pub struct PtySession {
    /// 会话 ID
    id: String,
    /// 写入线程的输入队列，关闭后为 None
    input: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    /// PTY Master（用于调整大小）
    master: Mutex<Box<dyn MasterPty + Send>>,
    /// 子进程终止器
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    /// 会话状态
    status: Arc<Mutex<PtyStatus>>,
    /// 关闭标志
    shutdown_flag: Arc<AtomicBool>,
}

impl PtySession {
    /// 创建 PTY 并启动 Shell
    pub fn spawn(
        id: String,
        config: &TerminalConfig,
        geometry: Geometry,
        events: mpsc::UnboundedSender<PtyEvent>,
    ) -> Result<Self, TerminalError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(geometry))
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;

        let shell = config.resolve_shell();
        tracing::info!("[终端] 会话 {} 使用 shell: {}", id, shell);

        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", &config.term);

        // 设置工作目录为用户主目录
        if let Some(home) = dirs::home_dir() {
            cmd.cwd(home);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;
        // 子进程退出后读取端才能收到 EOF
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        spawn_writer(id.clone(), writer, input_rx);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;

        let killer = child.clone_killer();

        let status = Arc::new(Mutex::new(PtyStatus::Running));
        let status_clone = status.clone();
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown_flag_clone = shutdown_flag.clone();
        let id_clone = id.clone();

        // 读取线程同时负责回收子进程
        std::thread::spawn(move || {
            let mut buffer = [0u8; READ_BUFFER_SIZE];
            let read_error = loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break None,
                    Ok(n) => {
                        if events
                            .send(PtyEvent::Output(Bytes::copy_from_slice(&buffer[..n])))
                            .is_err()
                        {
                            tracing::debug!("[终端] 会话 {} 输出通道已关闭", id_clone);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    // Linux 上子进程退出后读取返回 EIO
                    Err(e) => break Some(e),
                }
            };

            let shutting_down = shutdown_flag_clone.load(Ordering::Relaxed);
            match child.wait() {
                Ok(exit) => {
                    *status_clone.lock() = PtyStatus::Done;
                    if !shutting_down {
                        tracing::info!(
                            "[终端] 会话 {} 进程已退出 (code={})",
                            id_clone,
                            exit.exit_code()
                        );
                    }
                    let _ = events.send(PtyEvent::Exited {
                        exit_code: Some(exit.exit_code()),
                    });
                }
                Err(e) => {
                    *status_clone.lock() = PtyStatus::Error;
                    let message = read_error
                        .map(|r| format!("{}; {}", r, e))
                        .unwrap_or_else(|| e.to_string());
                    tracing::error!("[终端] 会话 {} 回收进程失败: {}", id_clone, message);
                    let _ = events.send(PtyEvent::Failed(message));
                }
            }
        });

        tracing::info!("[终端] 会话 {} 已创建 ({})", id, geometry);

        Ok(Self {
            id,
            input: Mutex::new(Some(input_tx)),
            master: Mutex::new(pair.master),
            killer: Mutex::new(killer),
            status,
            shutdown_flag,
        })
    }
}

/// 写入线程：按顺序把输入写入 PTY，队列关闭或写入失败时退出
fn spawn_writer(
    id: String,
    mut writer: Box<dyn Write + Send>,
    mut input: mpsc::UnboundedReceiver<Bytes>,
) {
    std::thread::spawn(move || {
        while let Some(data) = input.blocking_recv() {
            if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                tracing::warn!("[终端] 会话 {} 写入失败: {}", id, e);
                break;
            }
        }
        tracing::debug!("[终端] 会话 {} 写入线程退出", id);
    });
}

impl PtyHost for PtySession {
    fn write(&self, data: &[u8]) -> Result<(), TerminalError> {
        let input = self.input.lock();
        let Some(tx) = input.as_ref() else {
            return Err(TerminalError::WriteFailed("会话已关闭".to_string()));
        };
        tx.send(Bytes::copy_from_slice(data))
            .map_err(|_| TerminalError::WriteFailed("写入线程已退出".to_string()))
    }

    fn resize(&self, geometry: Geometry) -> Result<(), TerminalError> {
        self.master
            .lock()
            .resize(pty_size(geometry))
            .map_err(|e| TerminalError::ResizeFailed(e.to_string()))?;
        tracing::debug!("[终端] 会话 {} 调整大小为 {}", self.id, geometry);
        Ok(())
    }

    fn close(&self) {
        if self.shutdown_flag.swap(true, Ordering::Relaxed) {
            return;
        }
        self.input.lock().take();
        if *self.status.lock() == PtyStatus::Running {
            if let Err(e) = self.killer.lock().kill() {
                tracing::debug!("[终端] 会话 {} 结束进程失败: {}", self.id, e);
            }
        }
        tracing::info!("[终端] 会话 {} 已关闭", self.id);
    }

    fn status(&self) -> PtyStatus {
        *self.status.lock()
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.close();
    }
}
