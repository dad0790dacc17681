use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    pub registry: Registry,
    /// 登录提交，按结果分组：success / failure / bad_format / bootstrap
    pub login_attempts: IntCounterVec,
    pub lockouts: IntCounter,
    pub rate_limited: IntCounter,
    pub misconfigured: IntCounter,
    pub internal_errors: IntCounter,
    pub sweep_removed: IntCounter,
    pub attempt_store_entries: IntGauge,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new("gate_login_attempts_total", "Login submissions grouped by result"),
            &["result"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let lockouts = IntCounter::new("gate_lockouts_total", "Clients locked out after too many failures")?;
        registry.register(Box::new(lockouts.clone()))?;

        let rate_limited = IntCounter::new("gate_rate_limited_total", "Login submissions rejected by the lockout")?;
        registry.register(Box::new(rate_limited.clone()))?;

        let misconfigured = IntCounter::new(
            "gate_misconfigured_total",
            "Login submissions rejected because of missing or invalid server credentials",
        )?;
        registry.register(Box::new(misconfigured.clone()))?;

        let internal_errors = IntCounter::new("gate_internal_errors_total", "Internal gate failures")?;
        registry.register(Box::new(internal_errors.clone()))?;

        let sweep_removed = IntCounter::new("gate_sweep_removed_total", "Attempt records removed by the sweeper")?;
        registry.register(Box::new(sweep_removed.clone()))?;

        let attempt_store_entries = IntGauge::new("gate_attempt_store_entries", "Attempt records currently held")?;
        registry.register(Box::new(attempt_store_entries.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            lockouts,
            rate_limited,
            misconfigured,
            internal_errors,
            sweep_removed,
            attempt_store_entries,
        })
    }

    pub fn render(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

// 指标名固定且只注册一次，失败说明代码有误
pub static METRICS: Lazy<Metrics> =
    Lazy::new(|| Metrics::new().expect("prometheus metrics registration"));
