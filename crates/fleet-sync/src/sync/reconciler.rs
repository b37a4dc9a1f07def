//! 本地对账：把远端变更逐条应用到本地集合
//!
//! - added / modified：按 key 查找，存在则整体覆盖（远端为准），否则插入
//! - removed：存在则删除，不存在为 no-op
//! - 单条事件的解码或存储失败只记录日志，批次继续处理

use tracing::{debug, error, warn};

use crate::codec::{parse_document_id, DecodeError, RecordCodec};
use crate::remote::{ChangeBatch, ChangeType, DocumentChange};
use crate::storage::LocalCollection;

/// 单条变更的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Inserted { dropped_entries: usize },
    Updated { dropped_entries: usize },
    Removed,
    /// 删除了本地并不存在的记录
    MissingRemoval,
    DecodeFailed(DecodeError),
    StoreFailed(String),
}

/// 一个批次的处理汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub missing_removals: usize,
    pub decode_failures: usize,
    pub store_failures: usize,
    /// 被丢弃的召回 / 保养条目总数
    pub dropped_entries: usize,
    /// 会话已结束，批次被整体忽略
    pub stale: bool,
}

impl ApplyReport {
    pub fn stale() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Inserted { dropped_entries } => {
                self.inserted += 1;
                self.dropped_entries += dropped_entries;
            }
            ApplyOutcome::Updated { dropped_entries } => {
                self.updated += 1;
                self.dropped_entries += dropped_entries;
            }
            ApplyOutcome::Removed => self.removed += 1,
            ApplyOutcome::MissingRemoval => self.missing_removals += 1,
            ApplyOutcome::DecodeFailed(_) => self.decode_failures += 1,
            ApplyOutcome::StoreFailed(_) => self.store_failures += 1,
        }
    }

    /// 已处理的变更数
    pub fn total(&self) -> usize {
        self.inserted
            + self.updated
            + self.removed
            + self.missing_removals
            + self.decode_failures
            + self.store_failures
    }

    pub fn has_failures(&self) -> bool {
        self.decode_failures > 0 || self.store_failures > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalReconciler {
    codec: RecordCodec,
}

impl LocalReconciler {
    pub fn new(codec: RecordCodec) -> Self {
        Self { codec }
    }

    /// 按投递顺序逐条应用，不重新排序
    pub fn apply_batch<S>(&self, batch: &ChangeBatch, store: &mut S) -> ApplyReport
    where
        S: LocalCollection + ?Sized,
    {
        let mut report = ApplyReport::default();
        for change in &batch.changes {
            let outcome = self.apply(change, store);
            report.record(&outcome);
        }
        debug!(
            "批次应用完成: inserted={} updated={} removed={} missing={} decode_failed={} store_failed={} dropped={}",
            report.inserted,
            report.updated,
            report.removed,
            report.missing_removals,
            report.decode_failures,
            report.store_failures,
            report.dropped_entries
        );
        report
    }

    /// 应用单条变更；任何失败都在这里被吞掉并记录
    pub fn apply<S>(&self, change: &DocumentChange, store: &mut S) -> ApplyOutcome
    where
        S: LocalCollection + ?Sized,
    {
        match change.change_type {
            ChangeType::Added | ChangeType::Modified => self.upsert(change, store),
            ChangeType::Removed => self.remove(change, store),
        }
    }

    fn upsert<S>(&self, change: &DocumentChange, store: &mut S) -> ApplyOutcome
    where
        S: LocalCollection + ?Sized,
    {
        let outcome = match self
            .codec
            .decode_with_report(&change.fields, &change.document_id)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("丢弃无法解码的文档 {} ({}): {}", change.document_id, change.change_type, e);
                return ApplyOutcome::DecodeFailed(e);
            }
        };
        let dropped_entries = outcome.dropped.len();
        let decoded = outcome.vehicle;

        let existing = match store.fetch_by_id(decoded.id) {
            Ok(existing) => existing,
            Err(e) => {
                error!("查询本地车辆 {} 失败: {}", decoded.id, e);
                return ApplyOutcome::StoreFailed(e.to_string());
            }
        };

        match existing {
            Some(mut local) => {
                local.overwrite_with(&decoded);
                if let Err(e) = store.save(&local) {
                    error!("覆盖本地车辆 {} 失败: {}", local.id, e);
                    return ApplyOutcome::StoreFailed(e.to_string());
                }
                debug!("覆盖本地车辆 {}", local.id);
                ApplyOutcome::Updated { dropped_entries }
            }
            None => {
                if let Err(e) = store.insert(&decoded) {
                    error!("插入本地车辆 {} 失败: {}", decoded.id, e);
                    return ApplyOutcome::StoreFailed(e.to_string());
                }
                debug!("插入本地车辆 {}", decoded.id);
                ApplyOutcome::Inserted { dropped_entries }
            }
        }
    }

    fn remove<S>(&self, change: &DocumentChange, store: &mut S) -> ApplyOutcome
    where
        S: LocalCollection + ?Sized,
    {
        let Some(id) = parse_document_id(&change.document_id) else {
            warn!("忽略非法文档 key 的删除事件: {:?}", change.document_id);
            return ApplyOutcome::DecodeFailed(DecodeError::InvalidDocumentId(
                change.document_id.clone(),
            ));
        };

        match store.fetch_by_id(id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("本地不存在 {}，删除事件忽略", id);
                return ApplyOutcome::MissingRemoval;
            }
            Err(e) => {
                error!("查询本地车辆 {} 失败: {}", id, e);
                return ApplyOutcome::StoreFailed(e.to_string());
            }
        }

        match store.delete(id) {
            Ok(true) => {
                debug!("删除本地车辆 {}", id);
                ApplyOutcome::Removed
            }
            Ok(false) => ApplyOutcome::MissingRemoval,
            Err(e) => {
                error!("删除本地车辆 {} 失败: {}", id, e);
                ApplyOutcome::StoreFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{document_id, field_map_from_json, FieldMap};
    use crate::model::Vehicle;
    use crate::storage::MemoryCollection;
    use serde_json::json;
    use uuid::Uuid;

    fn reconciler() -> LocalReconciler {
        LocalReconciler::new(RecordCodec::new())
    }

    fn civic(mileage: i64) -> FieldMap {
        field_map_from_json(json!({
            "make": "Honda", "model": "Civic", "year": 2024, "mileage": mileage
        }))
    }

    #[test]
    fn added_twice_yields_one_record_with_latest_values() {
        let key = document_id(Uuid::new_v4());
        let mut store = MemoryCollection::new();
        let r = reconciler();

        assert_eq!(
            r.apply(&DocumentChange::added(key.clone(), civic(100)), &mut store),
            ApplyOutcome::Inserted { dropped_entries: 0 }
        );
        assert_eq!(
            r.apply(&DocumentChange::added(key.clone(), civic(200)), &mut store),
            ApplyOutcome::Updated { dropped_entries: 0 }
        );

        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].mileage, 200);
    }

    #[test]
    fn modified_overwrites_every_field() {
        let mut local = Vehicle::new("Honda", "Civic", 2020);
        local.trim = "EX".to_string();
        local.color = "Blue".to_string();
        let mut store = MemoryCollection::with_vehicles([local.clone()]);

        let change = DocumentChange::modified(document_id(local.id), civic(5));
        reconciler().apply(&change, &mut store);

        let updated = store.fetch_by_id(local.id).unwrap().unwrap();
        assert_eq!(updated.year, 2024);
        assert_eq!(updated.mileage, 5);
        // 远端缺失的字段回退默认值，而不是保留本地值
        assert_eq!(updated.trim, "");
        assert_eq!(updated.color, "");
    }

    #[test]
    fn modified_for_unknown_key_inserts() {
        let key = document_id(Uuid::new_v4());
        let mut store = MemoryCollection::new();
        let outcome = reconciler().apply(&DocumentChange::modified(key, civic(1)), &mut store);
        assert_eq!(outcome, ApplyOutcome::Inserted { dropped_entries: 0 });
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn removed_for_missing_key_is_noop() {
        let mut store = MemoryCollection::with_vehicles([Vehicle::new("Honda", "Civic", 2024)]);
        let outcome = reconciler().apply(
            &DocumentChange::removed(document_id(Uuid::new_v4())),
            &mut store,
        );
        assert_eq!(outcome, ApplyOutcome::MissingRemoval);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn removed_deletes_local_record() {
        let v = Vehicle::new("Honda", "Civic", 2024);
        let mut store = MemoryCollection::with_vehicles([v.clone()]);
        let outcome = reconciler().apply(&DocumentChange::removed(document_id(v.id)), &mut store);
        assert_eq!(outcome, ApplyOutcome::Removed);
        assert!(store.is_empty());
    }

    #[test]
    fn bad_events_do_not_stop_the_batch() {
        let good_a = document_id(Uuid::new_v4());
        let good_b = document_id(Uuid::new_v4());
        let failing = Uuid::new_v4();
        let mut store = MemoryCollection::new();
        store.fail_operations_for(failing);

        let batch = ChangeBatch::new(vec![
            DocumentChange::added(good_a.clone(), civic(1)),
            DocumentChange::added("not-a-uuid", civic(2)),
            DocumentChange::added(
                document_id(Uuid::new_v4()),
                field_map_from_json(json!({ "model": "Civic", "year": 2024 })),
            ),
            DocumentChange::added(document_id(failing), civic(3)),
            DocumentChange::added(good_b.clone(), civic(4)),
            DocumentChange::removed("garbage"),
        ]);
        let report = reconciler().apply_batch(&batch, &mut store);

        assert_eq!(report.inserted, 2);
        assert_eq!(report.decode_failures, 3);
        assert_eq!(report.store_failures, 1);
        assert_eq!(report.total(), 6);
        assert!(report.has_failures());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn grouped_batch_applies_in_delivery_order() {
        let existing = Vehicle::new("BMW", "M4", 2022);
        let doomed = Vehicle::new("Ford", "F-150", 2019);
        let new_key = document_id(Uuid::new_v4());
        let mut store = MemoryCollection::with_vehicles([existing.clone(), doomed.clone()]);

        let batch = ChangeBatch::new(vec![
            DocumentChange::added(new_key.clone(), civic(10)),
            DocumentChange::modified(
                document_id(existing.id),
                field_map_from_json(json!({ "make": "BMW", "model": "M4", "year": 2023 })),
            ),
            DocumentChange::removed(document_id(doomed.id)),
            // 同一批次内先新增后删除
            DocumentChange::removed(new_key),
        ]);
        let report = reconciler().apply_batch(&batch, &mut store);

        assert_eq!(
            report,
            ApplyReport {
                inserted: 1,
                updated: 1,
                removed: 2,
                ..ApplyReport::default()
            }
        );
        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].year, 2023);
    }

    #[test]
    fn dropped_nested_entries_are_counted() {
        let mut fields = civic(0);
        fields.extend(field_map_from_json(json!({
            "recalls": [{ "title": "no id" }, { "id": Uuid::new_v4().to_string(), "title": "ok" }]
        })));
        let mut store = MemoryCollection::new();
        let batch = ChangeBatch::new(vec![DocumentChange::added(
            document_id(Uuid::new_v4()),
            fields,
        )]);
        let report = reconciler().apply_batch(&batch, &mut store);
        assert_eq!(report.dropped_entries, 1);
        assert_eq!(store.snapshot()[0].recalls.len(), 1);
    }
}
