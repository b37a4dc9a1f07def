//! 数据库迁移与初始化，由 refinery 管理
//!
//! 统一入口 `init_db`：pragmas → migrate → 版本校验。
//! 新增迁移只需在 migrations/ 添加 V{n}__{name}.sql，编译期嵌入、打开时执行。

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use rusqlite::Connection;
use tracing::debug;

use crate::error::{FleetSyncError, Result};
use crate::version::FLEET_DB_VERSION;

/// refinery 的 migration 历史表名
const REFINERY_TABLE: &str = "refinery_schema_history";

/// WAL、NORMAL 同步、内存临时表
const PRAGMAS: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA temp_store=MEMORY;
";

pub fn enable_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS.trim())
        .map_err(|e| FleetSyncError::LocalStore(format!("设置 PRAGMA 失败: {}", e)))
}

/// 执行内置 migrations（编译期嵌入，按版本顺序执行）
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| FleetSyncError::LocalStore(format!("执行 migration 失败: {}", e)))?;
    for m in report.applied_migrations() {
        debug!("已应用 migration: {}", m);
    }
    Ok(())
}

/// 当前数据库的 migration 版本；无历史表或空表返回 None
pub fn db_migration_version(conn: &Connection) -> Result<Option<i64>> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            [REFINERY_TABLE],
            |row| row.get(0),
        )
        .map_err(|e| FleetSyncError::LocalStore(format!("查询 {} 失败: {}", REFINERY_TABLE, e)))?;

    if !exists {
        return Ok(None);
    }

    let version: Option<i64> = conn
        .query_row(
            &format!("SELECT MAX(version) FROM {}", REFINERY_TABLE),
            [],
            |row| row.get::<_, Option<i64>>(0),
        )
        .map_err(|e| FleetSyncError::LocalStore(format!("读取 migration 版本失败: {}", e)))?;

    Ok(version.filter(|&v| v > 0))
}

/// DB 版本高于当前 crate 支持的最高版本时拒绝打开
fn check_db_version(conn: &Connection) -> Result<()> {
    let Some(v) = db_migration_version(conn)? else {
        return Ok(());
    };
    if v > FLEET_DB_VERSION {
        return Err(FleetSyncError::LocalStore(format!(
            "数据库版本 {} 高于当前支持的最高版本 {}，请升级后再打开",
            v, FLEET_DB_VERSION
        )));
    }
    Ok(())
}

pub fn init_db(conn: &mut Connection) -> Result<()> {
    enable_pragmas(conn)?;
    run_migrations(conn)?;
    check_db_version(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_creates_schema_and_records_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(db_migration_version(&conn).unwrap(), None);

        init_db(&mut conn).unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='vehicles')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists);
        assert_eq!(db_migration_version(&conn).unwrap(), Some(FLEET_DB_VERSION));
    }

    #[test]
    fn init_db_is_repeatable() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        init_db(&mut conn).unwrap();
    }

    #[test]
    fn newer_database_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (version, name, applied_on, checksum) VALUES (?1, 'future', '', '0')",
                REFINERY_TABLE
            ),
            [FLEET_DB_VERSION + 1],
        )
        .unwrap();
        assert!(check_db_version(&conn).is_err());
    }
}
