//! 应用运行器模块
//!
//! `serve`：启动终端服务直到 Ctrl-C。
//! `connect`：把当前终端接到远端 Shell，会话结束后可回车重连。
//! `config`：输出或写入生效的配置。

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{collapse_tilde, save_config, to_yaml, Config};
use crate::logger;
use crate::server::ServerState;
use crate::terminal::{
    spawn_session, terminal_ws_url, LocalTerminal, SessionState, TerminalSession, WsConnector,
};

use super::bootstrap;
use super::cli::{Cli, Command};

/// 解析配置、初始化日志并执行子命令
pub async fn run(cli: Cli) -> Result<()> {
    let config = bootstrap::load_and_validate_config(&cli)?;
    let log = bootstrap::log_config(&config, &cli)?;
    logger::init(&log).context("初始化日志失败")?;

    match &cli.command {
        Command::Serve(_) => run_server(config).await,
        Command::Connect(_) => run_client(config).await,
        Command::Config(args) => {
            let path = bootstrap::config_path(&cli);
            let mut stdout = std::io::stdout();
            run_config(&config, &path, args.write, &mut stdout)
        }
    }
}

/// 运行服务端，收到 Ctrl-C 后优雅退出
pub async fn run_server(config: Config) -> Result<()> {
    let mut server = ServerState::new(config);
    let addr = server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("启动服务失败")?;
    println!("termbridge listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("监听 Ctrl-C 失败")?;
    tracing::info!("[SERVER] 收到退出信号");
    server.stop().await;
    Ok(())
}

/// 输出生效配置，`write` 时写入配置文件
pub fn run_config(
    config: &Config,
    path: &Path,
    write: bool,
    out: &mut dyn Write,
) -> Result<()> {
    if write {
        save_config(config, path).context("写入配置失败")?;
        writeln!(out, "wrote {}", collapse_tilde(path))?;
    } else {
        write!(out, "{}", to_yaml(config)?)?;
    }
    Ok(())
}

/// 客户端每轮会话的结果
enum Outcome {
    /// 用户按下 Ctrl-] 或 stdin 关闭
    Detached,
    /// 会话被远端或网络结束
    Ended,
}

/// 运行客户端
pub async fn run_client(config: Config) -> Result<()> {
    let url = terminal_ws_url(&config.client.server_url, &config.server.ws_path)
        .context("无效的服务地址")?;
    let connector = Arc::new(WsConnector::new(url.clone())?);

    let (local, mut input) = LocalTerminal::start();
    let (session, events) = TerminalSession::new(
        connector,
        Arc::new(local.clone()),
        Arc::new(config.emulator.clone()),
        local.viewport(),
    );
    let mut handle = spawn_session(session, events);

    println!("Connecting to {url} (press Ctrl-] to detach)");

    loop {
        let previous = handle.epoch();
        handle.set_viewport(local.viewport());
        handle.open();

        let outcome = tokio::select! {
            _ = input.detached() => Outcome::Detached,
            _ = handle.wait_until(|s| s.epoch > previous && s.state == SessionState::Closed) => {
                Outcome::Ended
            }
        };

        match outcome {
            Outcome::Detached => {
                handle.close();
                break;
            }
            Outcome::Ended => {
                print!("Press Enter to reconnect, or q + Enter to quit: ");
                let _ = std::io::stdout().flush();
                match input.read_line().await {
                    Some(line) if line.eq_ignore_ascii_case("q") => break,
                    Some(_) => continue,
                    None => break,
                }
            }
        }
    }

    handle.shutdown().await;
    println!();
    Ok(())
}
