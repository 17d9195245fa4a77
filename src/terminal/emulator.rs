//! 终端模拟器接口
//!
//! 桥接层不做终端仿真，只负责把字节送进、送出模拟器。
//! 主题与字体是进程级的不可变配置，在构造模拟器时传入。

use serde::{Deserialize, Serialize};

use super::geometry::Geometry;
use super::transport::EventSink;

/// 终端配色
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalTheme {
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_foreground")]
    pub foreground: String,
    #[serde(default = "default_cursor")]
    pub cursor: String,
    #[serde(default = "default_selection_background")]
    pub selection_background: String,
    /// ANSI 0-15 号颜色，顺序为 black, red, green, yellow, blue, magenta, cyan, white 及其高亮版本
    #[serde(default = "default_ansi")]
    pub ansi: Vec<String>,
}

fn default_background() -> String {
    "#0f172a".to_string()
}

fn default_foreground() -> String {
    "#e2e8f0".to_string()
}

fn default_cursor() -> String {
    "#60a5fa".to_string()
}

fn default_selection_background() -> String {
    "#334155".to_string()
}

fn default_ansi() -> Vec<String> {
    [
        "#0f172a", "#ef4444", "#22c55e", "#eab308", "#3b82f6", "#a855f7", "#06b6d4", "#e2e8f0",
        "#475569", "#f87171", "#4ade80", "#facc15", "#60a5fa", "#c084fc", "#22d3ee", "#f8fafc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for TerminalTheme {
    fn default() -> Self {
        Self {
            background: default_background(),
            foreground: default_foreground(),
            cursor: default_cursor(),
            selection_background: default_selection_background(),
            ansi: default_ansi(),
        }
    }
}

impl TerminalTheme {
    /// 所有颜色值
    pub fn colors(&self) -> impl Iterator<Item = &str> {
        [
            &self.background,
            &self.foreground,
            &self.cursor,
            &self.selection_background,
        ]
        .into_iter()
        .chain(self.ansi.iter())
        .map(String::as_str)
    }
}

/// 解析 `#rrggbb` 颜色
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// 模拟器外观配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmulatorConfig {
    #[serde(default = "default_cursor_blink")]
    pub cursor_blink: bool,
    #[serde(default = "default_font_size")]
    pub font_size: u16,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub theme: TerminalTheme,
}

fn default_cursor_blink() -> bool {
    true
}

fn default_font_size() -> u16 {
    13
}

fn default_font_family() -> String {
    r#"ui-monospace, SFMono-Regular, "SF Mono", Menlo, monospace"#.to_string()
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            cursor_blink: default_cursor_blink(),
            font_size: default_font_size(),
            font_family: default_font_family(),
            theme: TerminalTheme::default(),
        }
    }
}

/// 终端模拟器
///
/// 按键与尺寸变化由模拟器通过构造时拿到的 `EventSink` 报告。
pub trait Emulator: Send {
    /// 当前视口尺寸
    fn geometry(&self) -> Geometry;

    /// 写入远端输出，返回实际接收的字节数
    ///
    /// 返回值小于 `data.len()` 表示暂时无法继续接收，
    /// 模拟器恢复后需调用 `EventSink::drained`。
    fn write_output(&mut self, data: &[u8]) -> usize;

    /// 释放模拟器，可重复调用
    fn dispose(&mut self);
}

/// 模拟器工厂，每次连接创建一个全新实例
pub trait EmulatorFactory: Send + Sync {
    fn create(&self, config: &EmulatorConfig, viewport: Geometry, sink: EventSink) -> Box<dyn Emulator>;
}
