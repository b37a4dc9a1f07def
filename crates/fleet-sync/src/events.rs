//! 事件系统：会话生命周期、批次应用、同步错误、上传 / 删除结果的广播

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::sync::{ApplyReport, LastSyncError};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// 身份已绑定，订阅已建立
    SessionStarted { identity: String },
    /// 订阅已断开；`identity` 为断开前绑定的身份
    SessionStopped { identity: Option<String> },
    /// 一个批次已应用到本地
    BatchApplied(ApplyReport),
    /// 粘性同步错误发生变化（None 表示已清除）
    SyncErrorChanged(Option<LastSyncError>),
    VehicleUploaded { vehicle_id: Uuid },
    VehicleDeleted { vehicle_id: Uuid },
}

impl SyncEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::SessionStarted { .. } => "session_started",
            SyncEvent::SessionStopped { .. } => "session_stopped",
            SyncEvent::BatchApplied(_) => "batch_applied",
            SyncEvent::SyncErrorChanged(_) => "sync_error_changed",
            SyncEvent::VehicleUploaded { .. } => "vehicle_uploaded",
            SyncEvent::VehicleDeleted { .. } => "vehicle_deleted",
        }
    }
}

/// 事件统计
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<&'static str, u64>,
    pub last_event_time: Option<DateTime<Utc>>,
}

/// 事件管理器，克隆共享同一个广播通道
#[derive(Debug, Clone)]
pub struct EventManager {
    sender: broadcast::Sender<SyncEvent>,
    stats: Arc<Mutex<EventStats>>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            stats: Arc::new(Mutex::new(EventStats::default())),
        }
    }

    pub fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());
        {
            let mut stats = self.stats.lock();
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type()).or_insert(0) += 1;
            stats.last_event_time = Some(Utc::now());
        }
        // 没有订阅者时 send 失败属正常情况
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn stats(&self) -> EventStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let events = EventManager::new(16);
        let mut rx = events.subscribe();
        let id = Uuid::new_v4();
        events.emit(SyncEvent::VehicleUploaded { vehicle_id: id });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::VehicleUploaded { vehicle_id: id }
        );
    }

    #[test]
    fn emit_without_subscribers_still_counts() {
        let events = EventManager::new(4);
        events.emit(SyncEvent::SessionStopped { identity: None });
        events.emit(SyncEvent::SyncErrorChanged(None));
        events.emit(SyncEvent::SyncErrorChanged(None));
        let stats = events.stats();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.events_by_type["sync_error_changed"], 2);
        assert!(stats.last_event_time.is_some());
    }
}
