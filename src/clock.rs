use chrono::Utc;

/// 时间源（Unix 毫秒），便于测试中注入可控时间
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_epoch_millis() {
        // 2020-01-01 之后
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
