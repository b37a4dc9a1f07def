//! 同步会话状态机：Idle ⇄ Active
//!
//! - `start`：已 Active 时先拆除旧订阅，再绑定新身份并建立订阅
//! - `stop`：断开订阅、清空身份，可重复调用
//! - 生命周期切换由调用方串行化；每次切换都会推进会话代数，旧订阅的回调随即失效

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use super::guard::SessionEpoch;
use super::listener::{ChangeListener, ListenerContext};
use super::status::{LastSyncError, SyncErrorKind, SyncStatus};
use crate::error::{FleetSyncError, Result};
use crate::events::{EventManager, SyncEvent};
use crate::remote::{CollectionPath, RemoteStore};
use crate::storage::LocalStoreHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

#[derive(Debug)]
struct ActiveSession {
    path: CollectionPath,
    listener: ChangeListener,
}

pub struct SyncSession {
    remote: Arc<dyn RemoteStore>,
    users_collection: String,
    vehicles_collection: String,
    epoch: SessionEpoch,
    status: SyncStatus,
    events: EventManager,
    active: Option<ActiveSession>,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

impl SyncSession {
    pub fn new(remote: Arc<dyn RemoteStore>, status: SyncStatus, events: EventManager) -> Self {
        Self {
            remote,
            users_collection: CollectionPath::DEFAULT_USERS.to_string(),
            vehicles_collection: CollectionPath::DEFAULT_VEHICLES.to_string(),
            epoch: SessionEpoch::new(),
            status,
            events,
            active: None,
        }
    }

    /// 自定义远端集合名（默认 users / vehicles）
    pub fn with_collections(mut self, users: impl Into<String>, vehicles: impl Into<String>) -> Self {
        self.users_collection = users.into();
        self.vehicles_collection = vehicles.into();
        self
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn identity(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.path.identity())
    }

    /// 当前绑定的集合路径
    pub fn path(&self) -> Option<&CollectionPath> {
        self.active.as_ref().map(|a| &a.path)
    }

    /// 订阅任务仍在运行
    pub fn is_listening(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.listener.is_attached())
    }

    pub fn last_sync_error(&self) -> Option<LastSyncError> {
        self.status.current()
    }

    pub fn subscribe_sync_error(&self) -> watch::Receiver<Option<LastSyncError>> {
        self.status.subscribe()
    }

    /// 绑定身份并建立订阅
    ///
    /// 身份非法时直接返回错误，当前会话不受影响。
    /// 订阅建立失败时记录同步错误并返回 `Listener` 错误，会话停留在 Idle。
    pub async fn start(&mut self, identity: &str, store: LocalStoreHandle) -> Result<()> {
        let path = CollectionPath::with_collections(
            &self.users_collection,
            identity,
            &self.vehicles_collection,
        )?;

        if self.active.is_some() {
            info!("重新启动同步会话，先拆除旧订阅");
            self.stop();
        }

        let guard = self.epoch.advance();
        let stream = match self.remote.listen(&path).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("建立订阅 {} 失败: {}", path, e);
                self.epoch.invalidate();
                let error = LastSyncError::from_remote(SyncErrorKind::Attach, &e);
                self.status.record(error.clone());
                self.events.emit(SyncEvent::SyncErrorChanged(Some(error)));
                return Err(FleetSyncError::Listener(e));
            }
        };

        let listener = ChangeListener::spawn(
            stream,
            ListenerContext {
                store,
                guard,
                status: self.status.clone(),
                events: self.events.clone(),
                path: path.clone(),
            },
        );
        info!("同步会话已启动: {}", path);
        self.events.emit(SyncEvent::SessionStarted {
            identity: identity.to_string(),
        });
        self.active = Some(ActiveSession { path, listener });
        Ok(())
    }

    /// 断开订阅并回到 Idle
    pub fn stop(&mut self) {
        self.epoch.invalidate();
        let Some(active) = self.active.take() else {
            return;
        };
        let identity = active.path.identity().to_string();
        active.listener.detach();
        info!("同步会话已停止: {}", active.path);
        self.events.emit(SyncEvent::SessionStopped {
            identity: Some(identity),
        });
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.epoch.invalidate();
    }
}
