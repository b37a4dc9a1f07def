//! 变更订阅任务
//!
//! 每个批次交给存储 Actor 整批应用，应用完成后才读取下一批。
//! 流错误写入粘性同步错误，不会结束会话；会话结束后收到的批次一律忽略。

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::guard::SessionGuard;
use super::status::{LastSyncError, SyncErrorKind, SyncStatus};
use crate::events::{EventManager, SyncEvent};
use crate::remote::{ChangeStream, CollectionPath};
use crate::storage::LocalStoreHandle;

/// 订阅任务依赖的共享状态
#[derive(Debug, Clone)]
pub(crate) struct ListenerContext {
    pub store: LocalStoreHandle,
    pub guard: SessionGuard,
    pub status: SyncStatus,
    pub events: EventManager,
    pub path: CollectionPath,
}

impl ListenerContext {
    fn record_error(&self, error: LastSyncError) {
        self.status.record(error.clone());
        self.events.emit(SyncEvent::SyncErrorChanged(Some(error)));
    }
}

/// 订阅句柄；drop 或 detach 即取消订阅
#[derive(Debug)]
pub struct ChangeListener {
    path: CollectionPath,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ChangeListener {
    pub(crate) fn spawn(stream: ChangeStream, ctx: ListenerContext) -> Self {
        let cancel = CancellationToken::new();
        let path = ctx.path.clone();
        let task = tokio::spawn(run(stream, ctx, cancel.clone()));
        Self { path, cancel, task }
    }

    pub fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// 任务仍在运行
    pub fn is_attached(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }

    pub fn detach(self) {
        self.cancel.cancel();
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(mut stream: ChangeStream, ctx: ListenerContext, cancel: CancellationToken) {
    debug!("开始监听 {}", ctx.path);
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };

        if !ctx.guard.is_current() {
            debug!("会话已结束，停止监听 {}", ctx.path);
            break;
        }

        match item {
            Some(Ok(batch)) => {
                let size = batch.len();
                match ctx.store.apply_batch(batch, Some(ctx.guard.clone())).await {
                    Ok(report) if report.stale => {
                        debug!("批次在应用前会话已结束 ({} 条)", size);
                        break;
                    }
                    Ok(report) => {
                        if ctx.status.clear() {
                            info!("同步恢复，清除同步错误");
                            ctx.events.emit(SyncEvent::SyncErrorChanged(None));
                        }
                        ctx.events.emit(SyncEvent::BatchApplied(report));
                    }
                    Err(e) => {
                        error!("本地存储不可用，停止监听 {}: {}", ctx.path, e);
                        ctx.record_error(LastSyncError::new(SyncErrorKind::LocalStore, e.to_string()));
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                warn!("变更流错误 {}: {}", ctx.path, e);
                ctx.record_error(LastSyncError::from_remote(SyncErrorKind::Stream, &e));
            }
            None => {
                warn!("变更流已关闭: {}", ctx.path);
                ctx.record_error(LastSyncError::new(SyncErrorKind::Closed, "change stream closed"));
                break;
            }
        }
    }
    debug!("监听任务退出: {}", ctx.path);
}
