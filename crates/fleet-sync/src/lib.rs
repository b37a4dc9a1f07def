//! Fleet Sync - 车辆档案的本地 / 远端双向同步引擎
//!
//! 本 crate 提供：
//! - 🚗 车辆聚合模型（登记、保险、召回、保养、估值）
//! - 🔁 记录编解码：强类型聚合 ⇄ 远端弱类型文档，宽松解码、嵌套条目独立校验
//! - 📥 本地对账：远端 added / modified / removed 事件按 key 应用到本地集合
//! - 📤 上行推送：单条上传 / 删除，全量推送的部分失败汇总
//! - 🧵 单线程存储 Actor：所有本地读写与整批对账串行执行
//! - ⚙️ 会话管理：身份绑定、订阅生命周期、粘性同步错误
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleet_sync::{FleetSync, FleetSyncConfig, MemoryRemoteStore, Vehicle};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FleetSyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .build();
//!     fleet_sync::logging::init_logging(&config);
//!
//!     let fleet = FleetSync::initialize(config, Arc::new(MemoryRemoteStore::new()))?;
//!     fleet.sign_in("user-123").await?;
//!     fleet.add_vehicle(Vehicle::new("Tesla", "Model 3", 2021)).await?;
//!
//!     if let Some(err) = fleet.last_sync_error() {
//!         eprintln!("sync error: {}", err);
//!     }
//!     fleet.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod version;

pub use client::FleetSync;
pub use codec::{document_id, parse_document_id, DecodeError, FieldMap, FieldValue, RecordCodec};
pub use config::{FleetSyncConfig, FleetSyncConfigBuilder};
pub use error::{FleetSyncError, PartialSyncFailure, Result, SyncFailure};
pub use events::{EventManager, SyncEvent};
pub use model::{
    HealthStatus, Insurance, MaintenanceRecord, Recall, Registration, TrendDirection, Valuation,
    ValuationTrend, Vehicle,
};
pub use remote::{
    ChangeBatch, ChangeType, CollectionPath, DocumentChange, MemoryRemoteStore, RemoteError,
    RemoteStore,
};
pub use storage::{LocalCollection, LocalStoreHandle, MemoryCollection, SqliteCollection};
pub use sync::{
    ApplyReport, ChangeListener, LastSyncError, LocalReconciler, SessionState, SyncAllReport,
    SyncSession, SyncStatus, UploadCoordinator,
};
pub use version::{FLEET_DB_VERSION, FLEET_VERSION};
