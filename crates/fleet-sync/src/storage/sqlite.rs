//! SQLite 车辆集合
//!
//! 聚合根整体以 JSON 存入 `payload` 列；make / model / year 冗余成列便于排查。

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use super::migrate;
use super::LocalCollection;
use crate::codec::document_id;
use crate::error::{FleetSyncError, Result};
use crate::model::Vehicle;

pub struct SqliteCollection {
    conn: Connection,
}

impl std::fmt::Debug for SqliteCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCollection")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteCollection {
    /// 打开（必要时创建）数据库文件并执行迁移
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| FleetSyncError::IO(format!("创建数据目录失败: {}", e)))?;
            }
        }
        let conn = Connection::open(path)?;
        let collection = Self::from_connection(conn)?;
        info!("本地车辆库已打开: {}", path.display());
        Ok(collection)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrate::init_db(&mut conn)?;
        Ok(Self { conn })
    }

    fn key(id: Uuid) -> String {
        document_id(id)
    }

    fn decode_payload(payload: &str) -> Result<Vehicle> {
        Ok(serde_json::from_str(payload)?)
    }
}

impl LocalCollection for SqliteCollection {
    fn fetch_all(&self) -> Result<Vec<Vehicle>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM vehicles ORDER BY created_at ASC, rowid ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut vehicles = Vec::new();
        for payload in rows {
            vehicles.push(Self::decode_payload(&payload?)?);
        }
        Ok(vehicles)
    }

    fn fetch_by_id(&self, id: Uuid) -> Result<Option<Vehicle>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM vehicles WHERE id = ?1",
                params![Self::key(id)],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| Self::decode_payload(&p)).transpose()
    }

    fn insert(&mut self, vehicle: &Vehicle) -> Result<()> {
        let payload = serde_json::to_string(vehicle)?;
        let now = Utc::now().timestamp_millis();
        self.conn
            .execute(
                "INSERT INTO vehicles (id, make, model, year, payload, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    Self::key(vehicle.id),
                    vehicle.make,
                    vehicle.model,
                    vehicle.year,
                    payload,
                    now
                ],
            )
            .map_err(|e| {
                FleetSyncError::LocalStore(format!("插入车辆 {} 失败: {}", vehicle.id, e))
            })?;
        Ok(())
    }

    fn save(&mut self, vehicle: &Vehicle) -> Result<()> {
        let payload = serde_json::to_string(vehicle)?;
        let now = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO vehicles (id, make, model, year, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                make = excluded.make,
                model = excluded.model,
                year = excluded.year,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![
                Self::key(vehicle.id),
                vehicle.make,
                vehicle.model,
                vehicle.year,
                payload,
                now
            ],
        )?;
        Ok(())
    }

    fn delete(&mut self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM vehicles WHERE id = ?1", params![Self::key(id)])?;
        Ok(affected > 0)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vehicles", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Recall, TrendDirection, Valuation, ValuationTrend};
    use tempfile::TempDir;

    fn sample() -> Vehicle {
        let mut v = Vehicle::new("Tesla", "Model 3", 2021);
        v.mileage = 28_000;
        v.recalls.push(Recall {
            id: Uuid::new_v4(),
            title: "Seat belt chime".to_string(),
            details: String::new(),
            source: "NHTSA".to_string(),
            date_issued: Utc::now(),
            is_resolved: false,
        });
        v.valuation = Some(Valuation {
            trade_in: 29_000,
            private_sale: 34_200,
            dealer: 37_000,
            trend: ValuationTrend {
                amount: 450,
                direction: TrendDirection::Down,
                summary: String::new(),
            },
            last_updated: Utc::now(),
        });
        v
    }

    #[test]
    fn aggregate_survives_storage() {
        let mut store = SqliteCollection::open_in_memory().unwrap();
        let v = sample();
        store.insert(&v).unwrap();
        assert_eq!(store.fetch_by_id(v.id).unwrap(), Some(v.clone()));
        assert_eq!(store.fetch_all().unwrap(), vec![v]);
    }

    #[test]
    fn duplicate_insert_fails_but_save_overwrites() {
        let mut store = SqliteCollection::open_in_memory().unwrap();
        let mut v = sample();
        store.insert(&v).unwrap();
        assert!(store.insert(&v).is_err());

        v.model = "Model Y".to_string();
        store.save(&v).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.fetch_by_id(v.id).unwrap().unwrap().model, "Model Y");
    }

    #[test]
    fn save_inserts_missing_and_delete_reports_result() {
        let mut store = SqliteCollection::open_in_memory().unwrap();
        let v = sample();
        store.save(&v).unwrap();
        assert!(store.delete(v.id).unwrap());
        assert!(!store.delete(v.id).unwrap());
        assert_eq!(store.fetch_by_id(v.id).unwrap(), None);
    }

    #[test]
    fn reopening_file_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("fleet.db");
        let v = sample();
        {
            let mut store = SqliteCollection::open(&path).unwrap();
            store.insert(&v).unwrap();
        }
        let store = SqliteCollection::open(&path).unwrap();
        assert_eq!(store.fetch_all().unwrap(), vec![v]);
    }
}
