//! 请求处理器

mod api;
mod websocket;

pub use api::{health, list_sessions};
pub use websocket::{handle_terminal_socket, ws_upgrade_handler, SPAWN_FAILED_MESSAGE};
