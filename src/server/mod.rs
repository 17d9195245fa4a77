//! 终端 HTTP / WebSocket 服务器
//!
//! ## 路由
//! - `GET /health` - 健康检查
//! - `GET {ws_path}` - 终端 WebSocket（默认 `/api/terminal/ws`）
//! - `GET /api/terminal/sessions` - 当前终端会话列表

pub mod handlers;
pub mod pty_session;
pub mod registry;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::Config;
use crate::terminal::Geometry;
use pty_session::{NativePtyFactory, PtyHostFactory};
use registry::SessionRegistry;

/// 会话列表路径
pub const SESSIONS_PATH: &str = "/api/terminal/sessions";

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    /// PTY 进程工厂
    pub hosts: Arc<dyn PtyHostFactory>,
    /// 会话登记表
    pub registry: Arc<SessionRegistry>,
    /// 客户端握手前 PTY 使用的大小
    pub default_geometry: Geometry,
}

impl AppState {
    pub fn new(hosts: Arc<dyn PtyHostFactory>, default_geometry: Geometry) -> Self {
        Self {
            hosts,
            registry: Arc::new(SessionRegistry::new()),
            default_geometry,
        }
    }
}

/// 构建路由
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(ws_path, get(handlers::ws_upgrade_handler))
        .route(SESSIONS_PATH, get(handlers::list_sessions))
        .with_state(state)
}

/// 在已绑定的监听器上运行服务，直到收到关闭信号
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub running: bool,
    pub host: String,
    pub port: u16,
    pub uptime_secs: u64,
}

/// 服务器运行状态
pub struct ServerState {
    pub config: Config,
    pub running: bool,
    pub start_time: Option<std::time::Instant>,
    hosts: Arc<dyn PtyHostFactory>,
    registry: Option<Arc<SessionRegistry>>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ServerState {
    /// 使用本机 PTY 创建
    pub fn new(config: Config) -> Self {
        let hosts = Arc::new(NativePtyFactory::new(config.terminal.clone()));
        Self::with_hosts(config, hosts)
    }

    /// 使用指定的 PTY 工厂创建
    pub fn with_hosts(config: Config, hosts: Arc<dyn PtyHostFactory>) -> Self {
        Self {
            config,
            running: false,
            start_time: None,
            hosts,
            registry: None,
            local_addr: None,
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            running: self.running,
            host: self.config.server.host.clone(),
            port: self
                .local_addr
                .map(|addr| addr.port())
                .unwrap_or(self.config.server.port),
            uptime_secs: self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        }
    }

    /// 实际监听地址
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 会话登记表（运行中才有）
    pub fn registry(&self) -> Option<Arc<SessionRegistry>> {
        self.registry.clone()
    }

    /// 绑定端口并在后台运行服务
    ///
    /// 绑定失败直接返回错误；已在运行时返回当前地址。
    pub async fn start(&mut self) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
        if let (true, Some(addr)) = (self.running, self.local_addr) {
            return Ok(addr);
        }

        let host = self.config.server.host.clone();
        let port = self.config.server.port;
        let geometry = Geometry::new(self.config.terminal.cols, self.config.terminal.rows)?;

        let state = AppState::new(self.hosts.clone(), geometry);
        let registry = state.registry.clone();
        let app = build_router(state, &self.config.server.ws_path);

        let listener = TcpListener::bind((host.as_str(), port)).await?;
        let addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            if let Err(e) = serve(listener, app, rx).await {
                tracing::error!("[SERVER] 服务异常退出: {}", e);
            }
        });

        tracing::info!(
            "[SERVER] 监听 {}，终端路径 {}",
            addr,
            self.config.server.ws_path
        );

        self.shutdown_tx = Some(tx);
        self.task = Some(task);
        self.registry = Some(registry);
        self.local_addr = Some(addr);
        self.running = true;
        self.start_time = Some(std::time::Instant::now());
        Ok(addr)
    }

    /// 停止服务并等待后台任务结束
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("[SERVER] 服务任务异常: {}", e);
            }
        }
        if self.running {
            tracing::info!("[SERVER] 服务已停止");
        }
        self.running = false;
        self.start_time = None;
        self.local_addr = None;
        self.registry = None;
    }
}
