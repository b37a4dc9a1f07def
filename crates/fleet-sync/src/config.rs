use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FleetSyncError, Result};

/// 同步引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSyncConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// 本地数据库文件名（位于 data_dir 下）
    pub database_file: String,
    /// 远端用户集合名
    pub users_collection: String,
    /// 远端车辆子集合名
    pub vehicles_collection: String,
    /// 事件广播缓冲区大小
    pub event_buffer_size: usize,
    /// 调试模式（默认日志级别为 debug）
    pub debug_mode: bool,
}

impl Default for FleetSyncConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: "fleet.db".to_string(),
            users_collection: "users".to_string(),
            vehicles_collection: "vehicles".to_string(),
            event_buffer_size: 256,
            debug_mode: false,
        }
    }
}

/// 默认数据目录 ~/.fleet/
fn default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".fleet")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        home_dir.join(".fleet")
    } else {
        PathBuf::from("./fleet_data")
    }
}

impl FleetSyncConfig {
    pub fn builder() -> FleetSyncConfigBuilder {
        FleetSyncConfigBuilder::new()
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("users_collection", &self.users_collection),
            ("vehicles_collection", &self.vehicles_collection),
        ] {
            if value.is_empty() {
                return Err(FleetSyncError::Config(format!("{} 不能为空", name)));
            }
            if value.contains('/') {
                return Err(FleetSyncError::Config(format!(
                    "{} 不能包含 '/': {}",
                    name, value
                )));
            }
        }
        if self.database_file.is_empty() {
            return Err(FleetSyncError::Config("database_file 不能为空".into()));
        }
        if self.event_buffer_size == 0 {
            return Err(FleetSyncError::Config("event_buffer_size 必须大于 0".into()));
        }
        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct FleetSyncConfigBuilder {
    config: FleetSyncConfig,
}

impl FleetSyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn database_file<S: Into<String>>(mut self, file: S) -> Self {
        self.config.database_file = file.into();
        self
    }

    pub fn users_collection<S: Into<String>>(mut self, name: S) -> Self {
        self.config.users_collection = name.into();
        self
    }

    pub fn vehicles_collection<S: Into<String>>(mut self, name: S) -> Self {
        self.config.vehicles_collection = name.into();
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn build(self) -> FleetSyncConfig {
        self.config
    }
}
