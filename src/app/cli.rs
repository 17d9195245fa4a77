//! 命令行参数

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logger::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "termbridge",
    about = "Drive a remote interactive shell over a single WebSocket",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "TERMBRIDGE_CONFIG",
        value_name = "PATH",
        help = "Config file (defaults to <config dir>/termbridge/config.yaml)"
    )]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "TERMBRIDGE_LOG_LEVEL",
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: Option<LogLevel>,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "TERMBRIDGE_LOG_FILE",
        help = "Write logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve shells to terminal clients
    Serve(ServeArgs),
    /// Attach this terminal to a remote shell
    Connect(ConnectArgs),
    /// Print the effective configuration as YAML
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    #[arg(long, help = "Listen address")]
    pub host: Option<String>,

    #[arg(long, short = 'p', help = "Listen port")]
    pub port: Option<u16>,

    #[arg(long, value_name = "PATH", help = "Shell to run for each connection")]
    pub shell: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    #[arg(
        long,
        value_name = "URL",
        help = "Server URL (http://, https://, ws:// or wss://)"
    )]
    pub url: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    #[arg(long, help = "Write the configuration to the config file instead of printing it")]
    pub write: bool,
}
