//! 终端会话登记表
//!
//! 记录服务端每条终端连接对应的 PTY 会话，供会话列表接口查询。
//!
//! ## 功能
//! - 生成唯一的会话 ID
//! - 维护会话元数据（状态、大小、客户端信息）
//! - 提供线程安全的访问

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::terminal::{Geometry, PtyStatus, TerminalError};

/// 会话元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// 会话 ID
    pub id: String,
    /// 会话状态
    pub status: PtyStatus,
    /// 创建时间（Unix 时间戳，毫秒）
    pub created_at: i64,
    /// 终端行数
    pub rows: u16,
    /// 终端列数
    pub cols: u16,
    /// 客户端信息（User-Agent）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

/// 会话登记表
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionMetadata>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新会话，返回会话 ID
    pub async fn register(&self, geometry: Geometry, client: Option<String>) -> String {
        let session_id = Uuid::new_v4().to_string();
        let metadata = SessionMetadata {
            id: session_id.clone(),
            status: PtyStatus::Running,
            created_at: Utc::now().timestamp_millis(),
            rows: geometry.rows(),
            cols: geometry.cols(),
            client,
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), metadata);
        session_id
    }

    /// 更新会话大小
    pub async fn update_geometry(
        &self,
        session_id: &str,
        geometry: Geometry,
    ) -> Result<(), TerminalError> {
        let mut sessions = self.sessions.write().await;
        let metadata = sessions
            .get_mut(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;
        metadata.rows = geometry.rows();
        metadata.cols = geometry.cols();
        Ok(())
    }

    /// 更新会话状态
    pub async fn set_status(&self, session_id: &str, status: PtyStatus) -> Result<(), TerminalError> {
        let mut sessions = self.sessions.write().await;
        let metadata = sessions
            .get_mut(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;
        metadata.status = status;
        Ok(())
    }

    /// 移除会话
    pub async fn remove(&self, session_id: &str) -> Result<SessionMetadata, TerminalError> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))
    }

    /// 获取所有会话，按创建时间排序
    pub async fn list(&self) -> Vec<SessionMetadata> {
        let mut sessions: Vec<SessionMetadata> =
            self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// 获取单个会话信息
    pub async fn get(&self, session_id: &str) -> Option<SessionMetadata> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// 活跃会话数量
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
