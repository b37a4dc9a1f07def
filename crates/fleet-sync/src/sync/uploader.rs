//! 上行推送：单条上传 / 删除，以及带部分失败汇总的全量推送
//!
//! 每条记录独立写入（至少一次、非原子），成功的写入不会因其他记录失败而回滚。

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{document_id, RecordCodec};
use crate::error::{FleetSyncError, PartialSyncFailure, Result, SyncFailure};
use crate::model::Vehicle;
use crate::remote::{CollectionPath, RemoteStore};

/// sync_all 全部成功时的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncAllReport {
    pub uploaded: usize,
}

#[derive(Clone)]
pub struct UploadCoordinator {
    remote: Arc<dyn RemoteStore>,
    codec: RecordCodec,
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator").finish_non_exhaustive()
    }
}

impl UploadCoordinator {
    pub fn new(remote: Arc<dyn RemoteStore>, codec: RecordCodec) -> Self {
        Self { remote, codec }
    }

    /// 编码并整体写入，key 为车辆 id
    pub async fn upload_one(&self, path: &CollectionPath, vehicle: &Vehicle) -> Result<()> {
        let key = document_id(vehicle.id);
        let fields = self.codec.encode(vehicle);
        match self.remote.set_document(path, &key, fields).await {
            Ok(()) => {
                debug!("已上传 {}/{}", path, key);
                Ok(())
            }
            Err(source) => {
                warn!("上传 {} ({}) 失败: {}", vehicle.display_name(), key, source);
                Err(FleetSyncError::RemoteWrite {
                    document_id: key,
                    source,
                })
            }
        }
    }

    pub async fn delete_one(&self, path: &CollectionPath, vehicle_id: Uuid) -> Result<()> {
        let key = document_id(vehicle_id);
        match self.remote.delete_document(path, &key).await {
            Ok(()) => {
                debug!("已删除远端 {}/{}", path, key);
                Ok(())
            }
            Err(source) => {
                warn!("删除远端 {} 失败: {}", key, source);
                Err(FleetSyncError::RemoteWrite {
                    document_id: key,
                    source,
                })
            }
        }
    }

    /// 并发上传全部记录；有失败时返回 `PartialSync`，列出每一条失败的记录
    pub async fn sync_all(&self, path: &CollectionPath, vehicles: &[Vehicle]) -> Result<SyncAllReport> {
        let results = join_all(vehicles.iter().map(|v| self.upload_one(path, v))).await;

        let mut failures = Vec::new();
        let mut uploaded = 0;
        for (vehicle, result) in vehicles.iter().zip(results) {
            match result {
                Ok(()) => uploaded += 1,
                Err(e) => failures.push(SyncFailure {
                    vehicle_id: vehicle.id,
                    label: vehicle.display_name(),
                    message: remote_message(&e),
                }),
            }
        }

        if failures.is_empty() {
            info!("全量推送完成: {} 条", uploaded);
            return Ok(SyncAllReport { uploaded });
        }

        let partial = PartialSyncFailure {
            failures,
            succeeded: uploaded,
        };
        warn!(
            "全量推送部分失败: 成功 {}，失败 {}: {}",
            uploaded,
            partial.failures.len(),
            partial.details()
        );
        Err(FleetSyncError::PartialSync(partial))
    }
}

/// 失败明细只保留底层错误文本
fn remote_message(error: &FleetSyncError) -> String {
    match error {
        FleetSyncError::RemoteWrite { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FieldValue, ServerTimestamp};
    use crate::remote::{MemoryRemoteStore, RemoteError};

    fn setup() -> (UploadCoordinator, MemoryRemoteStore, CollectionPath) {
        let remote = MemoryRemoteStore::new();
        let uploader = UploadCoordinator::new(Arc::new(remote.clone()), RecordCodec::new());
        (uploader, remote, CollectionPath::for_identity("uid-1").unwrap())
    }

    #[tokio::test]
    async fn upload_one_writes_encoded_document() {
        let (uploader, remote, path) = setup();
        let v = Vehicle::new("Tesla", "Model 3", 2021);
        uploader.upload_one(&path, &v).await.unwrap();

        let doc = remote.document(&path, &document_id(v.id)).unwrap();
        assert_eq!(doc["make"], FieldValue::from("Tesla"));
        assert!(doc["createdAt"].as_timestamp().is_some());
        assert_ne!(
            doc["updatedAt"],
            FieldValue::ServerTimestamp(ServerTimestamp::Always)
        );
    }

    #[tokio::test]
    async fn upload_is_idempotent_by_key() {
        let (uploader, remote, path) = setup();
        let mut v = Vehicle::new("Tesla", "Model 3", 2021);
        uploader.upload_one(&path, &v).await.unwrap();
        v.mileage = 99;
        uploader.upload_one(&path, &v).await.unwrap();
        assert_eq!(remote.document_ids(&path).len(), 1);
        let doc = remote.document(&path, &document_id(v.id)).unwrap();
        assert_eq!(doc["mileage"].as_i64(), Some(99));
    }

    #[tokio::test]
    async fn upload_failure_is_returned_to_caller() {
        let (uploader, remote, path) = setup();
        let v = Vehicle::new("Tesla", "Model 3", 2021);
        remote.fail_writes_for(&document_id(v.id), RemoteError::Network("timeout".into()));
        let err = uploader.upload_one(&path, &v).await.unwrap_err();
        match err {
            FleetSyncError::RemoteWrite { document_id: key, source } => {
                assert_eq!(key, document_id(v.id));
                assert_eq!(source, RemoteError::Network("timeout".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_one_removes_document() {
        let (uploader, remote, path) = setup();
        let v = Vehicle::new("Tesla", "Model 3", 2021);
        uploader.upload_one(&path, &v).await.unwrap();
        uploader.delete_one(&path, v.id).await.unwrap();
        assert!(remote.document_ids(&path).is_empty());
        // 重复删除同样成功
        uploader.delete_one(&path, v.id).await.unwrap();
    }

    #[tokio::test]
    async fn sync_all_names_exactly_the_failed_records() {
        let (uploader, remote, path) = setup();
        let tesla = Vehicle::new("Tesla", "Model 3", 2021);
        let bmw = Vehicle::new("BMW", "M4", 2022);
        let honda = Vehicle::new("Honda", "Civic", 2024);
        remote.fail_writes_for(&document_id(tesla.id), RemoteError::Network("network timeout".into()));
        remote.fail_writes_for(
            &document_id(bmw.id),
            RemoteError::PermissionDenied("missing rule".into()),
        );

        let err = uploader
            .sync_all(&path, &[tesla.clone(), honda.clone(), bmw.clone()])
            .await
            .unwrap_err();
        let partial = err.partial_failure().unwrap();
        assert_eq!(partial.succeeded, 1);
        assert_eq!(partial.failed_ids(), vec![tesla.id, bmw.id]);
        assert_eq!(
            err.to_string(),
            "Some vehicles failed to sync: Tesla Model 3: network error: network timeout; \
             BMW M4: permission denied: missing rule"
        );
        // 成功的记录已提交，不回滚
        assert_eq!(remote.document_ids(&path), vec![document_id(honda.id)]);
    }

    #[tokio::test]
    async fn sync_all_success_and_empty_input() {
        let (uploader, remote, path) = setup();
        assert_eq!(
            uploader.sync_all(&path, &[]).await.unwrap(),
            SyncAllReport { uploaded: 0 }
        );
        let vehicles = vec![
            Vehicle::new("Tesla", "Model 3", 2021),
            Vehicle::new("Honda", "Civic", 2024),
        ];
        let report = uploader.sync_all(&path, &vehicles).await.unwrap();
        assert_eq!(report.uploaded, 2);
        assert_eq!(remote.write_count(), 2);
    }
}
