//! 本地存储模块
//!
//! - `LocalCollection`：本地车辆集合的最小契约（全量读取、按 key 读取、插入、保存、删除）
//! - `MemoryCollection`：内存实现（测试 / 演示）
//! - `SqliteCollection`：SQLite 实现，迁移由 refinery 管理
//! - `db_actor`：专用线程持有集合，所有本地读写经 channel 串行执行

pub mod db_actor;
pub mod memory;
pub mod migrate;
pub mod sqlite;

pub use db_actor::LocalStoreHandle;
pub use memory::MemoryCollection;
pub use sqlite::SqliteCollection;

use uuid::Uuid;

use crate::error::Result;
use crate::model::Vehicle;

/// 本地车辆集合
///
/// 同步核心不关心存储引擎；实现只需保证同一 id 至多一条记录。
pub trait LocalCollection: Send {
    /// 全部车辆，按插入顺序
    fn fetch_all(&self) -> Result<Vec<Vehicle>>;

    /// 按 id 精确查找
    fn fetch_by_id(&self, id: Uuid) -> Result<Option<Vehicle>>;

    /// 插入新记录；id 已存在时返回错误
    fn insert(&mut self, vehicle: &Vehicle) -> Result<()>;

    /// 按 id 整体写入（存在则覆盖，不存在则插入）
    fn save(&mut self, vehicle: &Vehicle) -> Result<()>;

    /// 按 id 删除；返回是否确实删除了记录
    fn delete(&mut self, id: Uuid) -> Result<bool>;

    fn count(&self) -> Result<usize> {
        Ok(self.fetch_all()?.len())
    }
}

impl<C: LocalCollection + ?Sized> LocalCollection for Box<C> {
    fn fetch_all(&self) -> Result<Vec<Vehicle>> {
        (**self).fetch_all()
    }

    fn fetch_by_id(&self, id: Uuid) -> Result<Option<Vehicle>> {
        (**self).fetch_by_id(id)
    }

    fn insert(&mut self, vehicle: &Vehicle) -> Result<()> {
        (**self).insert(vehicle)
    }

    fn save(&mut self, vehicle: &Vehicle) -> Result<()> {
        (**self).save(vehicle)
    }

    fn delete(&mut self, id: Uuid) -> Result<bool> {
        (**self).delete(id)
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }
}
