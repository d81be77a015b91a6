use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Encoder, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    pub registry: Registry,
    /// 按结果分组：success / failure / throttled
    pub login_attempts: CounterVec,
    /// 失败后立即触发封禁的次数
    pub login_bruteforce_blocked: Counter,
    pub throttle_tracked_keys: IntGauge,
    pub throttle_blocked_keys: IntGauge,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let login_attempts = CounterVec::new(
            Opts::new("login_attempts_total", "Login attempts grouped by result"),
            &["result"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let login_bruteforce_blocked =
            Counter::new("login_bruteforce_blocked_total", "Lockouts triggered by failed logins")?;
        registry.register(Box::new(login_bruteforce_blocked.clone()))?;

        let throttle_tracked_keys =
            IntGauge::new("login_throttle_tracked_keys", "Keys currently tracked by the login throttle")?;
        registry.register(Box::new(throttle_tracked_keys.clone()))?;

        let throttle_blocked_keys =
            IntGauge::new("login_throttle_blocked_keys", "Keys currently locked out by the login throttle")?;
        registry.register(Box::new(throttle_blocked_keys.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            login_bruteforce_blocked,
            throttle_tracked_keys,
            throttle_blocked_keys,
        })
    }

    pub fn record_login(&self, result: &str) {
        self.login_attempts.with_label_values(&[result]).inc();
    }

    pub fn render(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

pub static METRICS: Lazy<Metrics> = Lazy::new(|| Metrics::new().expect("注册 Prometheus 指标失败"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_login_metrics() {
        METRICS.record_login("success");
        METRICS.throttle_tracked_keys.set(3);

        let text = METRICS.render().unwrap();
        assert!(text.contains("login_attempts_total"));
        assert!(text.contains("login_throttle_tracked_keys"));
    }
}
