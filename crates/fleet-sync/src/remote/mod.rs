//! 远端文档存储抽象
//!
//! 远端以 `users/{identity}/vehicles` 为集合路径，文档 key 为车辆 id。
//! 传输层（原生客户端）通过 `RemoteStore` 注入，同步核心不依赖具体实现。

pub mod memory;

pub use memory::MemoryRemoteStore;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::codec::FieldMap;
use crate::error::{FleetSyncError, Result};

/// 远端传输 / 权限错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// 变更流被服务端关闭
    #[error("change stream closed")]
    StreamClosed,
    #[error("{0}")]
    Other(String),
}

/// 变更流：按投递顺序产出批次
pub type ChangeStream = BoxStream<'static, std::result::Result<ChangeBatch, RemoteError>>;

/// 远端文档存储
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 以 `document_id` 为 key 整体写入文档（幂等）
    async fn set_document(
        &self,
        path: &CollectionPath,
        document_id: &str,
        fields: FieldMap,
    ) -> std::result::Result<(), RemoteError>;

    /// 删除文档；文档不存在视为成功
    async fn delete_document(
        &self,
        path: &CollectionPath,
        document_id: &str,
    ) -> std::result::Result<(), RemoteError>;

    /// 订阅集合变更；第一批为当前快照（全部 `Added`）
    async fn listen(&self, path: &CollectionPath) -> std::result::Result<ChangeStream, RemoteError>;
}

/// 某个用户的车辆集合路径
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    users: String,
    identity: String,
    vehicles: String,
}

impl CollectionPath {
    pub const DEFAULT_USERS: &'static str = "users";
    pub const DEFAULT_VEHICLES: &'static str = "vehicles";

    /// `users/{identity}/vehicles`
    pub fn for_identity(identity: &str) -> Result<Self> {
        Self::with_collections(Self::DEFAULT_USERS, identity, Self::DEFAULT_VEHICLES)
    }

    pub fn with_collections(users: &str, identity: &str, vehicles: &str) -> Result<Self> {
        validate_identity(identity)?;
        Ok(Self {
            users: users.to_string(),
            identity: identity.to_string(),
            vehicles: vehicles.to_string(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.users, self.identity, self.vehicles)
    }
}

/// 身份是不透明字符串，但必须能作为单个路径段
pub fn validate_identity(identity: &str) -> Result<()> {
    if identity.trim().is_empty() {
        return Err(FleetSyncError::InvalidIdentity("identity is empty".into()));
    }
    if identity.contains('/') {
        return Err(FleetSyncError::InvalidIdentity(format!(
            "identity contains '/': {}",
            identity
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个文档的变更；`Removed` 的 fields 可能为空
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub change_type: ChangeType,
    pub document_id: String,
    pub fields: FieldMap,
}

impl DocumentChange {
    pub fn added(document_id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            change_type: ChangeType::Added,
            document_id: document_id.into(),
            fields,
        }
    }

    pub fn modified(document_id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            change_type: ChangeType::Modified,
            document_id: document_id.into(),
            fields,
        }
    }

    pub fn removed(document_id: impl Into<String>) -> Self {
        Self {
            change_type: ChangeType::Removed,
            document_id: document_id.into(),
            fields: FieldMap::new(),
        }
    }
}

/// 一次投递的变更批次（约定 added → modified → removed 分组）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub changes: Vec<DocumentChange>,
}

impl ChangeBatch {
    pub fn new(changes: Vec<DocumentChange>) -> Self {
        Self { changes }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
