//! 内存车辆集合
//!
//! 克隆共享同一份数据：集合交给 Actor 线程后，测试仍可通过克隆检查内容、注入故障。

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::LocalCollection;
use crate::error::{FleetSyncError, Result};
use crate::model::Vehicle;

#[derive(Debug, Default)]
struct Inner {
    /// 插入顺序
    vehicles: Vec<Vehicle>,
    /// 涉及这些 id 的任何操作都失败
    failing_ids: HashSet<Uuid>,
    /// 为 true 时 fetch_all 失败
    fail_fetch_all: bool,
}

impl Inner {
    fn check(&self, id: Uuid) -> Result<()> {
        if self.failing_ids.contains(&id) {
            return Err(FleetSyncError::LocalStore(format!(
                "injected failure for {}",
                id
            )));
        }
        Ok(())
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.vehicles.iter().position(|v| v.id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicles(vehicles: impl IntoIterator<Item = Vehicle>) -> Self {
        let collection = Self::new();
        collection.inner.lock().vehicles.extend(vehicles);
        collection
    }

    /// 之后涉及该 id 的读写都返回 `LocalStore` 错误
    pub fn fail_operations_for(&self, id: Uuid) {
        self.inner.lock().failing_ids.insert(id);
    }

    pub fn fail_fetch_all(&self, fail: bool) {
        self.inner.lock().fail_fetch_all = fail;
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.failing_ids.clear();
        inner.fail_fetch_all = false;
    }

    /// 当前内容快照
    pub fn snapshot(&self) -> Vec<Vehicle> {
        self.inner.lock().vehicles.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalCollection for MemoryCollection {
    fn fetch_all(&self) -> Result<Vec<Vehicle>> {
        let inner = self.inner.lock();
        if inner.fail_fetch_all {
            return Err(FleetSyncError::LocalStore("injected fetch_all failure".into()));
        }
        Ok(inner.vehicles.clone())
    }

    fn fetch_by_id(&self, id: Uuid) -> Result<Option<Vehicle>> {
        let inner = self.inner.lock();
        inner.check(id)?;
        Ok(inner.vehicles.iter().find(|v| v.id == id).cloned())
    }

    fn insert(&mut self, vehicle: &Vehicle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check(vehicle.id)?;
        if inner.position(vehicle.id).is_some() {
            return Err(FleetSyncError::LocalStore(format!(
                "vehicle {} already exists",
                vehicle.id
            )));
        }
        inner.vehicles.push(vehicle.clone());
        Ok(())
    }

    fn save(&mut self, vehicle: &Vehicle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check(vehicle.id)?;
        match inner.position(vehicle.id) {
            Some(i) => inner.vehicles[i] = vehicle.clone(),
            None => inner.vehicles.push(vehicle.clone()),
        }
        Ok(())
    }

    fn delete(&mut self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.check(id)?;
        match inner.position(id) {
            Some(i) => {
                inner.vehicles.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count(&self) -> Result<usize> {
        Ok(self.inner.lock().vehicles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicate_ids() {
        let mut store = MemoryCollection::new();
        let v = Vehicle::new("Honda", "Civic", 2024);
        store.insert(&v).unwrap();
        assert!(store.insert(&v).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_overwrites_in_place() {
        let a = Vehicle::new("Honda", "Civic", 2024);
        let b = Vehicle::new("Tesla", "Model 3", 2021);
        let mut store = MemoryCollection::with_vehicles([a.clone(), b.clone()]);

        let mut edited = a.clone();
        edited.mileage = 42;
        store.save(&edited).unwrap();

        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[0].mileage, 42);
        assert_eq!(all[1].id, b.id);
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let v = Vehicle::new("Honda", "Civic", 2024);
        let mut store = MemoryCollection::with_vehicles([v.clone()]);
        assert!(store.delete(v.id).unwrap());
        assert!(!store.delete(v.id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn clones_share_state_and_failures() {
        let v = Vehicle::new("Honda", "Civic", 2024);
        let observer = MemoryCollection::new();
        let mut store = observer.clone();
        observer.fail_operations_for(v.id);
        assert!(store.insert(&v).is_err());
        observer.clear_failures();
        store.insert(&v).unwrap();
        assert_eq!(observer.snapshot(), vec![v]);
    }
}
