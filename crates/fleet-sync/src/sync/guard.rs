//! 会话代数：start / stop 各推进一次，旧订阅持有的 guard 随即失效

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SessionEpoch {
    current: Arc<AtomicU64>,
}

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开启新一代，返回其 guard
    pub fn advance(&self) -> SessionGuard {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        SessionGuard {
            generation,
            current: Arc::clone(&self.current),
        }
    }

    /// 使所有已发出的 guard 失效
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// 在 start 时捕获；之后发生过 stop 或重新 start 则不再有效
#[derive(Debug, Clone)]
pub struct SessionGuard {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl SessionGuard {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
