//! 登录失败记录存储
//!
//! 闸门逻辑只依赖 [`AttemptStore`]；单进程使用 [`MemoryAttemptStore`]，
//! 多实例部署需要换成支持原子自增的共享存储。

use crate::clock::Clock;
use crate::metrics::METRICS;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 单个客户端的失败记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientAttemptRecord {
    /// 连续失败次数
    pub attempts: u32,
    /// 锁定截止时间（Unix 毫秒），0 或已过去表示未锁定
    pub lockout_until: i64,
}

impl ClientAttemptRecord {
    pub fn is_locked_at(&self, now_millis: i64) -> bool {
        self.lockout_until > now_millis
    }

    /// 可被清理：锁定已过期且没有失败计数
    pub fn is_stale_at(&self, now_millis: i64) -> bool {
        self.lockout_until < now_millis && self.attempts == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("失败记录存储不可用: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AttemptStore: Send + Sync + 'static {
    /// 读取客户端记录
    async fn get(&self, client: &str) -> Result<Option<ClientAttemptRecord>, StoreError>;

    /// 失败次数加一，返回新的计数
    async fn record_failure(&self, client: &str) -> Result<u32, StoreError>;

    /// 设置锁定截止时间
    async fn lock(&self, client: &str, until_millis: i64) -> Result<(), StoreError>;

    /// 删除客户端记录（登录成功或锁定期满）
    async fn reset(&self, client: &str) -> Result<(), StoreError>;

    /// 删除所有锁定已过期且计数为零的记录，返回删除数量
    async fn sweep(&self, now_millis: i64) -> Result<usize, StoreError>;

    /// 当前记录数
    async fn len(&self) -> Result<usize, StoreError>;
}

/// 进程内存储，重启即丢失
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    records: DashMap<String, ClientAttemptRecord>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn get(&self, client: &str) -> Result<Option<ClientAttemptRecord>, StoreError> {
        Ok(self.records.get(client).map(|r| *r))
    }

    async fn record_failure(&self, client: &str) -> Result<u32, StoreError> {
        let mut record = self.records.entry(client.to_string()).or_default();
        record.attempts = record.attempts.saturating_add(1);
        Ok(record.attempts)
    }

    async fn lock(&self, client: &str, until_millis: i64) -> Result<(), StoreError> {
        self.records
            .entry(client.to_string())
            .or_default()
            .lockout_until = until_millis;
        Ok(())
    }

    async fn reset(&self, client: &str) -> Result<(), StoreError> {
        self.records.remove(client);
        Ok(())
    }

    async fn sweep(&self, now_millis: i64) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_stale_at(now_millis));
        Ok(before.saturating_sub(self.records.len()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

/// 后台任务：定期清理过期记录，生命周期与进程相同
pub fn spawn_sweeper(
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // 第一次 tick 立即返回，跳过
        interval.tick().await;

        loop {
            interval.tick().await;
            sweep_once(store.as_ref(), clock.as_ref()).await;
        }
    })
}

async fn sweep_once(store: &dyn AttemptStore, clock: &dyn Clock) {
    match store.sweep(clock.now_millis()).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::debug!("清理了 {} 条过期的登录失败记录", removed);
                METRICS.sweep_removed.inc_by(removed as u64);
            }
        }
        Err(e) => tracing::warn!("清理登录失败记录失败: {}", e),
    }

    if let Ok(len) = store.len().await {
        METRICS.attempt_store_entries.set(i64::try_from(len).unwrap_or(i64::MAX));
    }
}
