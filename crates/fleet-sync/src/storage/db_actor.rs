//! 本地存储 Actor：单线程访问模型
//!
//! - 本地集合只存在于一个专用线程中
//! - 所有读写（包括整批对账）通过 channel 发送命令，按到达顺序串行执行
//! - 批次总是整体执行完毕后才处理下一条命令，不会交错

use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::LocalCollection;
use crate::codec::RecordCodec;
use crate::error::{FleetSyncError, Result};
use crate::model::Vehicle;
use crate::remote::ChangeBatch;
use crate::sync::{ApplyReport, LocalReconciler, SessionGuard};

/// 存储命令
pub enum StoreCommand {
    FetchAll {
        respond_to: oneshot::Sender<Result<Vec<Vehicle>>>,
    },
    FetchById {
        id: Uuid,
        respond_to: oneshot::Sender<Result<Option<Vehicle>>>,
    },
    Insert {
        vehicle: Vehicle,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Save {
        vehicle: Vehicle,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Delete {
        id: Uuid,
        respond_to: oneshot::Sender<Result<bool>>,
    },
    Count {
        respond_to: oneshot::Sender<Result<usize>>,
    },
    /// 对账一个远端批次；guard 已失效时整批忽略
    ApplyBatch {
        batch: ChangeBatch,
        guard: Option<SessionGuard>,
        respond_to: oneshot::Sender<ApplyReport>,
    },
    Shutdown,
}

struct StoreActor {
    receiver: Receiver<StoreCommand>,
    collection: Box<dyn LocalCollection>,
    reconciler: LocalReconciler,
}

impl StoreActor {
    fn run(mut self) {
        info!("🔄 [{:?}] StoreActor 开始处理命令", thread::current().id());

        while let Ok(command) = self.receiver.recv() {
            match command {
                StoreCommand::Shutdown => {
                    info!("🛑 StoreActor 收到停止信号");
                    break;
                }
                StoreCommand::FetchAll { respond_to } => {
                    let _ = respond_to.send(self.collection.fetch_all());
                }
                StoreCommand::FetchById { id, respond_to } => {
                    let _ = respond_to.send(self.collection.fetch_by_id(id));
                }
                StoreCommand::Insert {
                    vehicle,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.collection.insert(&vehicle));
                }
                StoreCommand::Save {
                    vehicle,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.collection.save(&vehicle));
                }
                StoreCommand::Delete { id, respond_to } => {
                    let _ = respond_to.send(self.collection.delete(id));
                }
                StoreCommand::Count { respond_to } => {
                    let _ = respond_to.send(self.collection.count());
                }
                StoreCommand::ApplyBatch {
                    batch,
                    guard,
                    respond_to,
                } => {
                    let report = self.handle_apply_batch(&batch, guard.as_ref());
                    let _ = respond_to.send(report);
                }
            }
        }

        info!("StoreActor 已退出");
    }

    fn handle_apply_batch(&mut self, batch: &ChangeBatch, guard: Option<&SessionGuard>) -> ApplyReport {
        if guard.is_some_and(|g| !g.is_current()) {
            debug!("会话已结束，忽略 {} 条变更", batch.len());
            return ApplyReport::stale();
        }
        self.reconciler
            .apply_batch(batch, self.collection.as_mut())
    }
}

/// 本地存储 Actor 句柄（异步调用，可克隆）
#[derive(Clone)]
pub struct LocalStoreHandle {
    sender: Sender<StoreCommand>,
}

impl std::fmt::Debug for LocalStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStoreHandle")
            .field("sender", &"<channel>")
            .finish()
    }
}

impl LocalStoreHandle {
    /// 启动 Actor 线程，集合的所有权移交给该线程
    pub fn spawn<C>(collection: C, codec: RecordCodec) -> Result<Self>
    where
        C: LocalCollection + 'static,
    {
        let (sender, receiver) = unbounded();
        let actor = StoreActor {
            receiver,
            collection: Box::new(collection),
            reconciler: LocalReconciler::new(codec),
        };

        thread::Builder::new()
            .name("fleet-store".to_string())
            .spawn(move || actor.run())
            .map_err(|e| FleetSyncError::IO(format!("无法启动 StoreActor 线程: {}", e)))?;

        Ok(Self { sender })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(build(tx)).map_err(|_| {
            error!("❌ [LocalStoreHandle] 发送命令失败: Actor 已停止");
            FleetSyncError::ActorStopped
        })?;
        rx.await.map_err(|_| FleetSyncError::ActorStopped)
    }

    pub async fn fetch_all(&self) -> Result<Vec<Vehicle>> {
        self.request(|respond_to| StoreCommand::FetchAll { respond_to })
            .await?
    }

    pub async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Vehicle>> {
        self.request(|respond_to| StoreCommand::FetchById { id, respond_to })
            .await?
    }

    pub async fn insert(&self, vehicle: Vehicle) -> Result<()> {
        self.request(|respond_to| StoreCommand::Insert {
            vehicle,
            respond_to,
        })
        .await?
    }

    pub async fn save(&self, vehicle: Vehicle) -> Result<()> {
        self.request(|respond_to| StoreCommand::Save {
            vehicle,
            respond_to,
        })
        .await?
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.request(|respond_to| StoreCommand::Delete { id, respond_to })
            .await?
    }

    pub async fn count(&self) -> Result<usize> {
        self.request(|respond_to| StoreCommand::Count { respond_to })
            .await?
    }

    /// 在 Actor 线程上整批对账
    pub async fn apply_batch(
        &self,
        batch: ChangeBatch,
        guard: Option<SessionGuard>,
    ) -> Result<ApplyReport> {
        self.request(|respond_to| StoreCommand::ApplyBatch {
            batch,
            guard,
            respond_to,
        })
        .await
    }

    /// 停止 Actor；已排队的命令先执行完
    pub fn shutdown(&self) {
        if self.sender.send(StoreCommand::Shutdown).is_err() {
            debug!("StoreActor 已经停止");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{document_id, field_map_from_json};
    use crate::remote::DocumentChange;
    use crate::storage::{MemoryCollection, SqliteCollection};
    use crate::sync::SessionEpoch;
    use serde_json::json;

    fn spawn_memory() -> (LocalStoreHandle, MemoryCollection) {
        let collection = MemoryCollection::new();
        let handle = LocalStoreHandle::spawn(collection.clone(), RecordCodec::new()).unwrap();
        (handle, collection)
    }

    fn added(id: Uuid) -> DocumentChange {
        DocumentChange::added(
            document_id(id),
            field_map_from_json(json!({ "make": "Honda", "model": "Civic", "year": 2024 })),
        )
    }

    #[test]
    fn crud_round_trip_through_actor() {
        let (handle, observer) = spawn_memory();
        let v = Vehicle::new("Tesla", "Model 3", 2021);

        tokio_test::block_on(handle.insert(v.clone())).unwrap();
        assert_eq!(tokio_test::block_on(handle.count()).unwrap(), 1);
        assert_eq!(
            tokio_test::block_on(handle.fetch_by_id(v.id)).unwrap(),
            Some(v.clone())
        );
        assert!(tokio_test::block_on(handle.delete(v.id)).unwrap());
        assert!(observer.is_empty());
    }

    #[test]
    fn store_errors_are_returned_to_caller() {
        let (handle, _) = spawn_memory();
        let v = Vehicle::new("Tesla", "Model 3", 2021);
        tokio_test::block_on(handle.insert(v.clone())).unwrap();
        let err = tokio_test::block_on(handle.insert(v)).unwrap_err();
        assert!(matches!(err, FleetSyncError::LocalStore(_)));
    }

    #[tokio::test]
    async fn apply_batch_respects_session_guard() {
        let (handle, observer) = spawn_memory();
        let epoch = SessionEpoch::new();
        let guard = epoch.advance();

        let report = handle
            .apply_batch(ChangeBatch::new(vec![added(Uuid::new_v4())]), Some(guard.clone()))
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);

        epoch.invalidate();
        let report = handle
            .apply_batch(ChangeBatch::new(vec![added(Uuid::new_v4())]), Some(guard))
            .await
            .unwrap();
        assert!(report.stale);
        assert_eq!(observer.len(), 1);
    }

    #[tokio::test]
    async fn commands_fail_after_shutdown() {
        let (handle, _) = spawn_memory();
        handle.shutdown();
        // 等待线程退出、接收端被释放
        let mut result = handle.count().await;
        for _ in 0..50 {
            if result.is_err() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            result = handle.count().await;
        }
        assert!(matches!(result, Err(FleetSyncError::ActorStopped)));
    }

    #[tokio::test]
    async fn sqlite_collection_runs_on_actor_thread() {
        let dir = tempfile::TempDir::new().unwrap();
        let collection = SqliteCollection::open(dir.path().join("fleet.db")).unwrap();
        let handle = LocalStoreHandle::spawn(collection, RecordCodec::new()).unwrap();

        let id = Uuid::new_v4();
        handle
            .apply_batch(ChangeBatch::new(vec![added(id)]), None)
            .await
            .unwrap();
        let stored = handle.fetch_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.display_name(), "Honda Civic");
    }
}
