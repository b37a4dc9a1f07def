use std::fmt;

use uuid::Uuid;

use crate::codec::DecodeError;
use crate::remote::RemoteError;

#[derive(Debug, thiserror::Error)]
pub enum FleetSyncError {
    /// 整条记录解码失败（必填字段缺失或类型错误）
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    /// 本地集合读写失败
    #[error("Local store error: {0}")]
    LocalStore(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 单条上传 / 删除失败
    #[error("Remote write failed for {document_id}: {source}")]
    RemoteWrite {
        document_id: String,
        #[source]
        source: RemoteError,
    },
    /// sync_all 中部分记录失败（成功部分不回滚）
    #[error("{0}")]
    PartialSync(PartialSyncFailure),
    /// 变更流本身出错
    #[error("Listener error: {0}")]
    Listener(RemoteError),
    /// 没有已绑定的用户身份
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
    /// 本地存储 Actor 已停止
    #[error("Store actor stopped")]
    ActorStopped,
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    IO(String),
}

impl From<serde_json::Error> for FleetSyncError {
    fn from(error: serde_json::Error) -> Self {
        FleetSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for FleetSyncError {
    fn from(error: std::io::Error) -> Self {
        FleetSyncError::IO(error.to_string())
    }
}

impl FleetSyncError {
    /// 仅影响单条记录的错误：记录日志后即可继续处理后续事件
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FleetSyncError::Decode(_)
                | FleetSyncError::LocalStore(_)
                | FleetSyncError::Sqlite(_)
                | FleetSyncError::Serialization(_)
                | FleetSyncError::RemoteWrite { .. }
        )
    }

    /// 部分同步失败的明细（如果是）
    pub fn partial_failure(&self) -> Option<&PartialSyncFailure> {
        match self {
            FleetSyncError::PartialSync(p) => Some(p),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetSyncError>;

/// sync_all 中单条记录的失败明细
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub vehicle_id: Uuid,
    /// 可读标签，如 "Tesla Model 3"
    pub label: String,
    pub message: String,
}

/// 多条上传失败的聚合结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSyncFailure {
    pub failures: Vec<SyncFailure>,
    pub succeeded: usize,
}

impl PartialSyncFailure {
    pub fn failed_ids(&self) -> Vec<Uuid> {
        self.failures.iter().map(|f| f.vehicle_id).collect()
    }

    /// "Tesla Model 3: timeout; BMW M4: permission denied"
    pub fn details(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.label, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for PartialSyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Some vehicles failed to sync: {}", self.details())
    }
}

impl std::error::Error for PartialSyncFailure {}
