//! 终端尺寸同步
//!
//! 跟踪本地视口尺寸，在连接建立时和尺寸变化时生成 `Resize` 控制帧。

use serde::Serialize;

use super::error::TerminalError;
use super::frame::ControlFrame;

/// 默认终端列数
pub const DEFAULT_COLS: u16 = 80;
/// 默认终端行数
pub const DEFAULT_ROWS: u16 = 24;

/// 终端尺寸（列数、行数均不小于 1）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Geometry {
    cols: u16,
    rows: u16,
}

impl Geometry {
    pub fn new(cols: u16, rows: u16) -> Result<Self, TerminalError> {
        if cols == 0 || rows == 0 {
            return Err(TerminalError::InvalidGeometry { cols, rows });
        }
        Ok(Self { cols, rows })
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// 对应的 `Resize` 控制帧
    pub fn resize_frame(&self) -> ControlFrame {
        ControlFrame::Resize {
            cols: self.cols,
            rows: self.rows,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// 尺寸同步器
///
/// 保存最近一次观察到的视口尺寸，以及当前连接上最近一次发出的尺寸。
/// 断开期间的变化只更新 `current`，不排队；下次连接时重新握手。
#[derive(Debug, Clone, Default)]
pub struct GeometrySync {
    current: Geometry,
    last_sent: Option<Geometry>,
}

impl GeometrySync {
    pub fn new(initial: Geometry) -> Self {
        Self {
            current: initial,
            last_sent: None,
        }
    }

    pub fn current(&self) -> Geometry {
        self.current
    }

    /// 记录新的视口尺寸
    pub fn observe(&mut self, geometry: Geometry) {
        self.current = geometry;
    }

    /// 连接建立时的握手帧，总是发送
    pub fn handshake(&mut self, geometry: Geometry) -> ControlFrame {
        self.current = geometry;
        self.last_sent = Some(geometry);
        geometry.resize_frame()
    }

    /// 已连接状态下的尺寸变化
    ///
    /// 与上次发送的尺寸相同时返回 `None`。
    pub fn on_change(&mut self, geometry: Geometry) -> Option<ControlFrame> {
        self.current = geometry;
        if self.last_sent == Some(geometry) {
            return None;
        }
        self.last_sent = Some(geometry);
        Some(geometry.resize_frame())
    }

    /// 连接拆除后清除发送记录
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_rejects_zero() {
        assert!(Geometry::new(0, 24).is_err());
        assert!(Geometry::new(80, 0).is_err());
        assert_eq!(Geometry::new(1, 1).unwrap().cols(), 1);
    }

    #[test]
    fn test_geometry_default_is_80x24() {
        let g = Geometry::default();
        assert_eq!((g.cols(), g.rows()), (80, 24));
        assert_eq!(g.to_string(), "80x24");
    }

    #[test]
    fn test_sync_deduplicates_unchanged_geometry() {
        let mut sync = GeometrySync::default();
        let initial = Geometry::default();
        assert_eq!(sync.handshake(initial), initial.resize_frame());
        assert_eq!(sync.on_change(initial), None);

        let larger = Geometry::new(120, 40).unwrap();
        assert_eq!(
            sync.on_change(larger),
            Some(ControlFrame::Resize {
                cols: 120,
                rows: 40
            })
        );
        assert_eq!(sync.on_change(larger), None);
    }

    #[test]
    fn test_sync_reset_forgets_last_sent() {
        let mut sync = GeometrySync::default();
        let g = Geometry::default();
        sync.handshake(g);
        sync.reset();
        assert!(sync.on_change(g).is_some());
    }

    #[test]
    fn test_observe_tracks_latest_without_sending() {
        let mut sync = GeometrySync::default();
        sync.observe(Geometry::new(100, 30).unwrap());
        sync.observe(Geometry::new(120, 40).unwrap());
        assert_eq!(sync.current(), Geometry::new(120, 40).unwrap());
    }
}
