//! 粘性的"最近一次同步错误"
//!
//! 变更流的传输 / 权限错误不抛出，而是写入这里；下一个成功应用的批次清除它。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::remote::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// 订阅建立失败
    Attach,
    /// 变更流投递了错误
    Stream,
    /// 变更流被关闭
    Closed,
    /// 本地存储 Actor 不可用
    LocalStore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastSyncError {
    pub kind: SyncErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl LastSyncError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn from_remote(kind: SyncErrorKind, error: &RemoteError) -> Self {
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for LastSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// 可观察的同步状态，克隆共享同一个值
#[derive(Debug, Clone)]
pub struct SyncStatus {
    sender: Arc<watch::Sender<Option<LastSyncError>>>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatus {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Option<LastSyncError> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LastSyncError>> {
        self.sender.subscribe()
    }

    pub fn record(&self, error: LastSyncError) {
        self.sender.send_replace(Some(error));
    }

    /// 清除错误；返回是否确实发生了变化
    pub fn clear(&self) -> bool {
        self.sender.send_if_modified(|current| current.take().is_some())
    }
}
