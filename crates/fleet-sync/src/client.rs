//! FleetSync 门面：把存储 Actor、同步会话、上行推送和事件总线组装在一起
//!
//! 分层：
//! 1. 本地存储 Actor（SQLite 或注入的集合）
//! 2. 事件管理器 + 粘性同步错误
//! 3. 上行推送
//! 4. 同步会话（身份 + 订阅）

use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

use crate::codec::RecordCodec;
use crate::config::FleetSyncConfig;
use crate::error::{FleetSyncError, Result};
use crate::events::{EventManager, SyncEvent};
use crate::model::Vehicle;
use crate::remote::{CollectionPath, RemoteStore};
use crate::storage::{LocalCollection, LocalStoreHandle, SqliteCollection};
use crate::sync::{LastSyncError, SyncAllReport, SyncSession, SyncStatus, UploadCoordinator};

pub struct FleetSync {
    config: FleetSyncConfig,
    store: LocalStoreHandle,
    uploader: UploadCoordinator,
    session: Mutex<SyncSession>,
    status: SyncStatus,
    events: EventManager,
}

impl std::fmt::Debug for FleetSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetSync")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl FleetSync {
    /// 以配置中的 SQLite 数据库为本地集合初始化
    pub fn initialize(config: FleetSyncConfig, remote: Arc<dyn RemoteStore>) -> Result<Arc<Self>> {
        config.validate()?;
        let collection = SqliteCollection::open(config.database_path())?;
        Self::assemble(config, collection, remote)
    }

    /// 使用注入的本地集合初始化
    pub fn with_collection<C>(
        config: FleetSyncConfig,
        collection: C,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Arc<Self>>
    where
        C: LocalCollection + 'static,
    {
        config.validate()?;
        Self::assemble(config, collection, remote)
    }

    /// 配置已校验
    fn assemble<C>(
        config: FleetSyncConfig,
        collection: C,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Arc<Self>>
    where
        C: LocalCollection + 'static,
    {
        info!("正在初始化 FleetSync...");
        let codec = RecordCodec::new();
        let store = LocalStoreHandle::spawn(collection, codec.clone())?;
        let events = EventManager::new(config.event_buffer_size);
        let status = SyncStatus::new();
        let uploader = UploadCoordinator::new(Arc::clone(&remote), codec);
        let session = SyncSession::new(remote, status.clone(), events.clone())
            .with_collections(&config.users_collection, &config.vehicles_collection);

        info!("FleetSync 初始化完成");
        Ok(Arc::new(Self {
            config,
            store,
            uploader,
            session: Mutex::new(session),
            status,
            events,
        }))
    }

    pub fn config(&self) -> &FleetSyncConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStoreHandle {
        &self.store
    }

    // ============================================================
    // 会话
    // ============================================================

    pub async fn start(&self, identity: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        session.start(identity, self.store.clone()).await
    }

    pub async fn stop(&self) {
        self.session.lock().await.stop();
    }

    /// 登录后：建立订阅，并把离线期间创建的本地记录推送一次
    pub async fn sign_in(&self, identity: &str) -> Result<SyncAllReport> {
        self.start(identity).await?;
        self.sync_all().await
    }

    pub async fn sign_out(&self) {
        self.stop().await;
    }

    pub async fn identity(&self) -> Option<String> {
        self.session.lock().await.identity().map(str::to_string)
    }

    pub async fn is_signed_in(&self) -> bool {
        self.session.lock().await.is_active()
    }

    /// 调用时刻绑定的集合路径；之后的 stop 不影响已发起的写入
    async fn current_path(&self) -> Option<CollectionPath> {
        self.session.lock().await.path().cloned()
    }

    async fn require_path(&self) -> Result<CollectionPath> {
        self.current_path().await.ok_or(FleetSyncError::NotSignedIn)
    }

    // ============================================================
    // 上行
    // ============================================================

    pub async fn upload_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        let path = self.require_path().await?;
        self.upload_to(&path, vehicle).await
    }

    pub async fn delete_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        let path = self.require_path().await?;
        self.delete_from(&path, vehicle).await
    }

    /// 推送全部本地记录
    pub async fn sync_all(&self) -> Result<SyncAllReport> {
        let path = self.require_path().await?;
        let vehicles = self.store.fetch_all().await?;
        let result = self.uploader.sync_all(&path, &vehicles).await;
        match &result {
            Ok(_) => {
                for v in &vehicles {
                    self.events.emit(SyncEvent::VehicleUploaded { vehicle_id: v.id });
                }
            }
            Err(FleetSyncError::PartialSync(partial)) => {
                let failed = partial.failed_ids();
                for v in vehicles.iter().filter(|v| !failed.contains(&v.id)) {
                    self.events.emit(SyncEvent::VehicleUploaded { vehicle_id: v.id });
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn upload_to(&self, path: &CollectionPath, vehicle: &Vehicle) -> Result<()> {
        self.uploader.upload_one(path, vehicle).await?;
        self.events.emit(SyncEvent::VehicleUploaded {
            vehicle_id: vehicle.id,
        });
        Ok(())
    }

    async fn delete_from(&self, path: &CollectionPath, vehicle: &Vehicle) -> Result<()> {
        self.uploader.delete_one(path, vehicle.id).await?;
        self.events.emit(SyncEvent::VehicleDeleted {
            vehicle_id: vehicle.id,
        });
        Ok(())
    }

    // ============================================================
    // 本地变更并镜像到远端
    // ============================================================

    /// 本地插入；已登录时随后上传。上传失败时本地记录保留，返回上传错误
    pub async fn add_vehicle(&self, vehicle: Vehicle) -> Result<()> {
        self.store.insert(vehicle.clone()).await?;
        match self.current_path().await {
            Some(path) => self.upload_to(&path, &vehicle).await,
            None => {
                info!("未登录，{} 仅保存在本地", vehicle.display_name());
                Ok(())
            }
        }
    }

    pub async fn update_vehicle(&self, vehicle: Vehicle) -> Result<()> {
        self.store.save(vehicle.clone()).await?;
        match self.current_path().await {
            Some(path) => self.upload_to(&path, &vehicle).await,
            None => Ok(()),
        }
    }

    pub async fn remove_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        if !self.store.delete(vehicle.id).await? {
            warn!("本地不存在 {}，仍尝试删除远端", vehicle.id);
        }
        match self.current_path().await {
            Some(path) => self.delete_from(&path, vehicle).await,
            None => Ok(()),
        }
    }

    pub async fn vehicles(&self) -> Result<Vec<Vehicle>> {
        self.store.fetch_all().await
    }

    // ============================================================
    // 观察
    // ============================================================

    pub fn last_sync_error(&self) -> Option<LastSyncError> {
        self.status.current()
    }

    pub fn watch_sync_error(&self) -> watch::Receiver<Option<LastSyncError>> {
        self.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// 停止会话并关闭存储 Actor
    pub async fn shutdown(&self) {
        self.stop().await;
        self.store.shutdown();
        info!("FleetSync 已关闭");
    }
}
