//! 同步引擎
//!
//! - `LocalReconciler`：远端变更 → 本地集合
//! - `UploadCoordinator`：本地记录 → 远端
//! - `SyncSession`：身份绑定与订阅生命周期
//! - `ChangeListener`：订阅任务句柄
//! - `SyncStatus`：粘性同步错误

mod guard;
mod listener;
mod reconciler;
mod session;
mod status;
mod uploader;

pub use guard::{SessionEpoch, SessionGuard};
pub use listener::ChangeListener;
pub use reconciler::{ApplyOutcome, ApplyReport, LocalReconciler};
pub use session::{SessionState, SyncSession};
pub use status::{LastSyncError, SyncErrorKind, SyncStatus};
pub use uploader::{SyncAllReport, UploadCoordinator};
