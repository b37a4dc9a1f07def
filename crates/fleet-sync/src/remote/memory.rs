//! 进程内远端文档存储
//!
//! 用于测试与演示：写入即解析服务端时间戳并向同一集合的全部订阅者广播变更，
//! 支持按文档注入写失败、向变更流注入错误或任意批次。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::debug;

use super::{ChangeBatch, ChangeStream, CollectionPath, DocumentChange, RemoteError, RemoteStore};
use crate::codec::{FieldMap, FieldValue, ServerTimestamp};

type Listener = mpsc::UnboundedSender<Result<ChangeBatch, RemoteError>>;

#[derive(Default)]
struct Inner {
    /// 集合路径 → (文档 key → 文档)
    collections: HashMap<String, BTreeMap<String, FieldMap>>,
    listeners: HashMap<String, Vec<Listener>>,
    /// 文档 key → 写入 / 删除时返回的错误
    failing_documents: HashMap<String, RemoteError>,
    /// 下一次 listen 返回的错误
    listen_failure: Option<RemoteError>,
    writes: usize,
    deletes: usize,
}

impl Inner {
    fn broadcast(&mut self, path: &str, batch: Result<ChangeBatch, RemoteError>) {
        if let Some(listeners) = self.listeners.get_mut(path) {
            listeners.retain(|tx| tx.unbounded_send(batch.clone()).is_ok());
        }
    }

    fn check_failure(&self, document_id: &str) -> Result<(), RemoteError> {
        match self.failing_documents.get(document_id) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for MemoryRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryRemoteStore")
            .field("collections", &inner.collections.len())
            .field("writes", &inner.writes)
            .finish()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- 故障注入 ----

    /// 之后对该文档的写入 / 删除都返回 `error`
    pub fn fail_writes_for(&self, document_id: &str, error: RemoteError) {
        self.inner
            .lock()
            .failing_documents
            .insert(document_id.to_string(), error);
    }

    pub fn clear_write_failures(&self) {
        self.inner.lock().failing_documents.clear();
    }

    /// 下一次 `listen` 失败
    pub fn fail_next_listen(&self, error: RemoteError) {
        self.inner.lock().listen_failure = Some(error);
    }

    /// 向该集合的所有订阅者投递一个错误
    pub fn push_error(&self, path: &CollectionPath, error: RemoteError) {
        self.inner.lock().broadcast(&path.to_string(), Err(error));
    }

    /// 向该集合的所有订阅者投递任意批次（不修改已存文档）
    pub fn push_batch(&self, path: &CollectionPath, batch: ChangeBatch) {
        self.inner.lock().broadcast(&path.to_string(), Ok(batch));
    }

    /// 服务端关闭该集合的全部变更流
    pub fn close_listeners(&self, path: &CollectionPath) {
        self.inner.lock().listeners.remove(&path.to_string());
    }

    // ---- 检查 ----

    pub fn document(&self, path: &CollectionPath, document_id: &str) -> Option<FieldMap> {
        self.inner
            .lock()
            .collections
            .get(&path.to_string())
            .and_then(|docs| docs.get(document_id))
            .cloned()
    }

    pub fn document_ids(&self, path: &CollectionPath) -> Vec<String> {
        self.inner
            .lock()
            .collections
            .get(&path.to_string())
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 仍然存活的订阅数
    pub fn listener_count(&self, path: &CollectionPath) -> usize {
        let mut inner = self.inner.lock();
        match inner.listeners.get_mut(&path.to_string()) {
            Some(listeners) => {
                listeners.retain(|tx| !tx.is_closed());
                listeners.len()
            }
            None => 0,
        }
    }

    /// 成功写入次数
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    /// 成功删除次数（含删除不存在的文档）
    pub fn delete_count(&self) -> usize {
        self.inner.lock().deletes
    }
}

/// 把哨兵值替换为服务端时间；`OnCreate` 在文档已存在时保留原值
fn resolve_server_timestamps(fields: FieldMap, previous: Option<&FieldMap>) -> FieldMap {
    let now = FieldValue::timestamp(Utc::now());
    fields
        .into_iter()
        .map(|(key, value)| {
            let resolved = match value {
                FieldValue::ServerTimestamp(ServerTimestamp::Always) => now.clone(),
                FieldValue::ServerTimestamp(ServerTimestamp::OnCreate) => previous
                    .and_then(|p| p.get(&key))
                    .filter(|v| v.as_timestamp().is_some())
                    .cloned()
                    .unwrap_or_else(|| now.clone()),
                other => other,
            };
            (key, resolved)
        })
        .collect()
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn set_document(
        &self,
        path: &CollectionPath,
        document_id: &str,
        fields: FieldMap,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.check_failure(document_id)?;

        let key = path.to_string();
        let docs = inner.collections.entry(key.clone()).or_default();
        let previous = docs.get(document_id);
        let existed = previous.is_some();
        let resolved = resolve_server_timestamps(fields, previous);
        docs.insert(document_id.to_string(), resolved.clone());
        inner.writes += 1;

        let change = if existed {
            DocumentChange::modified(document_id, resolved)
        } else {
            DocumentChange::added(document_id, resolved)
        };
        debug!("远端写入 {}/{} ({})", key, document_id, change.change_type);
        inner.broadcast(&key, Ok(ChangeBatch::new(vec![change])));
        Ok(())
    }

    async fn delete_document(
        &self,
        path: &CollectionPath,
        document_id: &str,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.check_failure(document_id)?;

        let key = path.to_string();
        inner.deletes += 1;
        let removed = inner
            .collections
            .get_mut(&key)
            .and_then(|docs| docs.remove(document_id))
            .is_some();
        if removed {
            debug!("远端删除 {}/{}", key, document_id);
            inner.broadcast(
                &key,
                Ok(ChangeBatch::new(vec![DocumentChange::removed(document_id)])),
            );
        }
        Ok(())
    }

    async fn listen(&self, path: &CollectionPath) -> Result<ChangeStream, RemoteError> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.listen_failure.take() {
            return Err(err);
        }

        let key = path.to_string();
        let snapshot: Vec<DocumentChange> = inner
            .collections
            .get(&key)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| DocumentChange::added(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let (tx, rx) = mpsc::unbounded();
        // 首批快照总会投递，即使集合为空
        let _ = tx.unbounded_send(Ok(ChangeBatch::new(snapshot)));
        inner.listeners.entry(key).or_default().push(tx);
        Ok(rx.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::field_map_from_json;
    use crate::remote::ChangeType;
    use serde_json::json;

    fn path() -> CollectionPath {
        CollectionPath::for_identity("uid-1").unwrap()
    }

    fn doc() -> FieldMap {
        let mut fields = field_map_from_json(json!({ "make": "Honda", "model": "Civic", "year": 2024 }));
        fields.insert(
            "createdAt".into(),
            FieldValue::ServerTimestamp(ServerTimestamp::OnCreate),
        );
        fields.insert(
            "updatedAt".into(),
            FieldValue::ServerTimestamp(ServerTimestamp::Always),
        );
        fields
    }

    #[tokio::test]
    async fn listen_delivers_snapshot_then_changes() {
        let remote = MemoryRemoteStore::new();
        remote.set_document(&path(), "A", doc()).await.unwrap();

        let mut stream = remote.listen(&path()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.changes[0].change_type, ChangeType::Added);

        remote.set_document(&path(), "A", doc()).await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.changes[0].change_type, ChangeType::Modified);

        remote.delete_document(&path(), "A").await.unwrap();
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.changes[0].change_type, ChangeType::Removed);
    }

    #[tokio::test]
    async fn empty_collection_still_delivers_initial_batch() {
        let remote = MemoryRemoteStore::new();
        let mut stream = remote.listen(&path()).await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_timestamps_resolve_and_created_at_is_write_once() {
        let remote = MemoryRemoteStore::new();
        remote.set_document(&path(), "A", doc()).await.unwrap();
        let first = remote.document(&path(), "A").unwrap();
        let created = first["createdAt"].as_timestamp().unwrap();
        assert!(first["updatedAt"].as_timestamp().is_some());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        remote.set_document(&path(), "A", doc()).await.unwrap();
        let second = remote.document(&path(), "A").unwrap();
        assert_eq!(second["createdAt"].as_timestamp().unwrap(), created);
        assert!(second["updatedAt"].as_timestamp().unwrap() > created);
    }

    #[tokio::test]
    async fn injected_write_failure_leaves_store_untouched() {
        let remote = MemoryRemoteStore::new();
        remote.fail_writes_for("A", RemoteError::PermissionDenied("nope".into()));
        let err = remote.set_document(&path(), "A", doc()).await.unwrap_err();
        assert_eq!(err, RemoteError::PermissionDenied("nope".into()));
        assert!(remote.document_ids(&path()).is_empty());

        remote.clear_write_failures();
        remote.set_document(&path(), "A", doc()).await.unwrap();
        assert_eq!(remote.document_ids(&path()), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn delete_of_missing_document_succeeds_silently() {
        let remote = MemoryRemoteStore::new();
        remote.delete_document(&path(), "missing").await.unwrap();
        assert_eq!(remote.delete_count(), 1);
    }

    #[tokio::test]
    async fn dropped_streams_are_pruned() {
        let remote = MemoryRemoteStore::new();
        let stream = remote.listen(&path()).await.unwrap();
        assert_eq!(remote.listener_count(&path()), 1);
        drop(stream);
        assert_eq!(remote.listener_count(&path()), 0);
    }

    #[tokio::test]
    async fn listen_failure_is_one_shot() {
        let remote = MemoryRemoteStore::new();
        remote.fail_next_listen(RemoteError::Network("offline".into()));
        assert!(remote.listen(&path()).await.is_err());
        assert!(remote.listen(&path()).await.is_ok());
    }
}
