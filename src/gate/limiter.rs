use super::store::{AttemptStore, StoreError};

/// 登录失败锁定策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// 触发锁定的失败次数
    pub max_attempts: u32,
    /// 锁定时长（分钟）
    pub lockout_minutes: u32,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_minutes: 15,
        }
    }
}

impl LockoutPolicy {
    pub fn lockout_millis(&self) -> i64 {
        i64::from(self.lockout_minutes) * 60_000
    }

    /// 失败后剩余的尝试次数
    pub fn remaining_after(&self, attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts)
    }
}

/// 限流检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    Allowed,
    Locked { minutes_left: u64 },
}

/// 向上取整的剩余分钟数
pub fn minutes_until(until_millis: i64, now_millis: i64) -> u64 {
    let left = until_millis.saturating_sub(now_millis).max(0);
    u64::try_from(left).unwrap_or(0).div_ceil(60_000)
}

/// 登录前的限流检查
///
/// - 锁定未到期：拒绝，不改动计数
/// - 锁定已到期：清除记录，重新计数
/// - 计数已达上限但尚未锁定：立即锁定
pub async fn check_rate_limit(
    store: &dyn AttemptStore,
    client: &str,
    now_millis: i64,
    policy: &LockoutPolicy,
) -> Result<RateLimit, StoreError> {
    let Some(record) = store.get(client).await? else {
        return Ok(RateLimit::Allowed);
    };

    if record.is_locked_at(now_millis) {
        return Ok(RateLimit::Locked {
            minutes_left: minutes_until(record.lockout_until, now_millis),
        });
    }

    if record.lockout_until != 0 {
        tracing::info!("客户端 {} 的锁定已到期，重置失败计数", client);
        store.reset(client).await?;
        return Ok(RateLimit::Allowed);
    }

    if record.attempts >= policy.max_attempts {
        engage_lockout(store, client, now_millis, policy).await?;
        return Ok(RateLimit::Locked {
            minutes_left: u64::from(policy.lockout_minutes),
        });
    }

    Ok(RateLimit::Allowed)
}

/// 记录一次密码错误；达到上限时立即锁定
///
/// 返回新的失败次数。
pub async fn register_failure(
    store: &dyn AttemptStore,
    client: &str,
    now_millis: i64,
    policy: &LockoutPolicy,
) -> Result<u32, StoreError> {
    let attempts = store.record_failure(client).await?;
    if attempts >= policy.max_attempts {
        engage_lockout(store, client, now_millis, policy).await?;
    }
    Ok(attempts)
}

async fn engage_lockout(
    store: &dyn AttemptStore,
    client: &str,
    now_millis: i64,
    policy: &LockoutPolicy,
) -> Result<(), StoreError> {
    let until = now_millis.saturating_add(policy.lockout_millis());
    store.lock(client, until).await?;
    tracing::warn!(
        "客户端 {} 登录失败次数过多，锁定 {} 分钟",
        client,
        policy.lockout_minutes
    );
    crate::metrics::METRICS.lockouts.inc();
    Ok(())
}
