//! 本地终端模拟器
//!
//! 命令行客户端把宿主终端直接当作模拟器使用：
//! 原始模式下 stdin 字节即按键字节，远端输出原样写到 stdout，
//! 仿真由宿主终端完成。
//!
//! stdin 只有一个读取线程；会话存活时字节路由到会话，
//! 否则路由到空闲通道，供客户端读取“回车重连”的提示输入。

use std::io::{Read, Write};
use std::sync::Arc;

use bytes::Bytes;
use crossterm::style::{Color, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::{cursor, execute, terminal};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use super::emulator::{parse_hex_color, Emulator, EmulatorConfig, EmulatorFactory};
use super::geometry::Geometry;
use super::transport::EventSink;

/// 断开键 Ctrl-]
pub const DETACH_KEY: u8 = 0x1d;

struct Shared {
    route: Mutex<Option<EventSink>>,
    idle: mpsc::UnboundedSender<Bytes>,
    detach: Notify,
}

impl Shared {
    fn route_input(&self, data: &[u8]) {
        let sink = self.route.lock().clone();
        match sink {
            Some(sink) => match data.iter().position(|&b| b == DETACH_KEY) {
                Some(pos) => {
                    if pos > 0 {
                        sink.input(data[..pos].to_vec());
                    }
                    self.detach.notify_one();
                }
                None => sink.input(data.to_vec()),
            },
            None => {
                let _ = self.idle.send(Bytes::copy_from_slice(data));
            }
        }
    }

    fn report_size(&self) {
        let Some(sink) = self.route.lock().clone() else {
            return;
        };
        if let Some(geometry) = current_size() {
            sink.resized(geometry);
        }
    }
}

fn current_size() -> Option<Geometry> {
    let (cols, rows) = terminal::size().ok()?;
    Geometry::new(cols, rows).ok()
}

fn to_color(value: &str) -> Option<Color> {
    parse_hex_color(value).map(|(r, g, b)| Color::Rgb { r, g, b })
}

/// 宿主终端
///
/// 实现 `EmulatorFactory`，每次连接创建一个 `LocalEmulator`。
#[derive(Clone)]
pub struct LocalTerminal {
    shared: Arc<Shared>,
}

/// 会话之外的本地输入
pub struct LocalInput {
    idle: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
}

impl LocalTerminal {
    /// 启动 stdin 读取线程与尺寸监听任务
    pub fn start() -> (Self, LocalInput) {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            route: Mutex::new(None),
            idle: idle_tx,
            detach: Notify::new(),
        });

        let reader = shared.clone();
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) => {
                        tracing::debug!("[终端] stdin 已关闭");
                        reader.detach.notify_one();
                        break;
                    }
                    Ok(n) => reader.route_input(&buffer[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::error!("[终端] 读取 stdin 失败: {}", e);
                        reader.detach.notify_one();
                        break;
                    }
                }
            }
        });

        tokio::spawn(watch_size(shared.clone()));

        let input = LocalInput {
            idle: idle_rx,
            shared: shared.clone(),
        };
        (Self { shared }, input)
    }

    /// 当前宿主终端尺寸
    pub fn viewport(&self) -> Geometry {
        current_size().unwrap_or_default()
    }
}

#[cfg(unix)]
async fn watch_size(shared: Arc<Shared>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut winch = match signal(SignalKind::window_change()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("[终端] 无法监听 SIGWINCH: {}", e);
            return;
        }
    };
    while winch.recv().await.is_some() {
        shared.report_size();
    }
}

#[cfg(not(unix))]
async fn watch_size(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(250));
    let mut last = current_size();
    loop {
        ticker.tick().await;
        let size = current_size();
        if size != last {
            last = size;
            shared.report_size();
        }
    }
}

impl LocalInput {
    /// 等待用户按下 Ctrl-] 或 stdin 关闭
    pub async fn detached(&self) {
        self.shared.detach.notified().await;
    }

    /// 读取一行空闲输入（会话关闭后，宿主终端处于行模式）
    ///
    /// stdin 关闭时返回 `None`。
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = Vec::new();
        loop {
            tokio::select! {
                chunk = self.idle.recv() => {
                    let chunk = chunk?;
                    match chunk.iter().position(|&b| b == b'\n' || b == b'\r') {
                        Some(pos) => {
                            line.extend_from_slice(&chunk[..pos]);
                            return Some(String::from_utf8_lossy(&line).trim().to_string());
                        }
                        None => line.extend_from_slice(&chunk),
                    }
                }
                _ = self.shared.detach.notified() => return None,
            }
        }
    }
}

impl EmulatorFactory for LocalTerminal {
    fn create(
        &self,
        config: &EmulatorConfig,
        viewport: Geometry,
        sink: EventSink,
    ) -> Box<dyn Emulator> {
        if let Err(e) = terminal::enable_raw_mode() {
            tracing::warn!("[终端] 无法进入原始模式: {}", e);
        }

        let mut stdout = std::io::stdout();
        if let Some(color) = to_color(&config.theme.foreground) {
            let _ = execute!(stdout, SetForegroundColor(color));
        }
        if let Some(color) = to_color(&config.theme.background) {
            let _ = execute!(stdout, SetBackgroundColor(color));
        }
        if config.cursor_blink {
            let _ = execute!(stdout, cursor::EnableBlinking);
        }

        let epoch = sink.epoch();
        *self.shared.route.lock() = Some(sink);

        Box::new(LocalEmulator {
            shared: self.shared.clone(),
            fallback: viewport,
            epoch,
            disposed: false,
        })
    }
}

/// 单个会话实例使用的本地模拟器
pub struct LocalEmulator {
    shared: Arc<Shared>,
    fallback: Geometry,
    epoch: u64,
    disposed: bool,
}

impl Emulator for LocalEmulator {
    fn geometry(&self) -> Geometry {
        current_size().unwrap_or(self.fallback)
    }

    fn write_output(&mut self, data: &[u8]) -> usize {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(data).and_then(|_| stdout.flush()) {
            tracing::debug!("[终端] 写入 stdout 失败: {}", e);
        }
        data.len()
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        {
            let mut route = self.shared.route.lock();
            if route.as_ref().map(EventSink::epoch) == Some(self.epoch) {
                *route = None;
            }
        }

        let mut stdout = std::io::stdout();
        let _ = execute!(stdout, ResetColor, cursor::DisableBlinking);
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!("[终端] 无法退出原始模式: {}", e);
        }
    }
}

impl Drop for LocalEmulator {
    fn drop(&mut self) {
        self.dispose();
    }
}
