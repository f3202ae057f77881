//! Prometheus 监控指标模块
//!
//! 轮询循环通过 [`MetricsSink`] 上报指标，不依赖全局 registry；
//! [`DiscoveryMetrics`] 是基于 prometheus crate 的默认实现，由 main 创建后注入。

use crate::types::PollOutcome;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// 轮询循环的指标观察者
///
/// 实现必须是线程安全的：轮询任务写入的同时，指标 HTTP 端点可能正在读取。
pub trait MetricsSink: Send + Sync {
    /// 记录一次 fetch 的耗时（无论成功失败）
    fn observe_fetch_latency(&self, elapsed: Duration);

    /// fetch 失败计数 +1
    fn increment_fetch_failure(&self);

    /// 记录一个轮询周期的结果
    fn record_outcome(&self, _outcome: PollOutcome) {}

    /// 记录一次目标文件写入的结果
    fn record_write(&self, _success: bool) {}
}

/// Prometheus-backed [`MetricsSink`] owning its own registry.
pub struct DiscoveryMetrics {
    registry: Registry,
    fetch_duration: Histogram,
    fetch_failures: IntCounter,
    poll_cycles: IntCounterVec,
    write_failures: IntCounter,
    last_successful_write: IntGauge,
}

impl DiscoveryMetrics {
    /// Create and register all metrics under `subsystem`.
    ///
    /// An empty subsystem produces unprefixed names.
    pub fn new(subsystem: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let fetch_duration = Histogram::with_opts(
            HistogramOpts::new("durations_histogram_seconds", "HTTP latency distributions.")
                .subsystem(subsystem),
        )?;

        let fetch_failures = IntCounter::with_opts(
            Opts::new(
                "custom_failed_get_discovery_total",
                "Total number of failed attempts to get the discovery endpoint.",
            )
            .subsystem(subsystem),
        )?;

        let poll_cycles = IntCounterVec::new(
            Opts::new("poll_cycles_total", "Total number of poll cycles by outcome.")
                .subsystem(subsystem),
            &["outcome"],
        )?;

        let write_failures = IntCounter::with_opts(
            Opts::new(
                "write_failures_total",
                "Total number of failed writes of the target file.",
            )
            .subsystem(subsystem),
        )?;

        let last_successful_write = IntGauge::with_opts(
            Opts::new(
                "last_successful_write_timestamp_seconds",
                "Unix timestamp of the last successful write of the target file.",
            )
            .subsystem(subsystem),
        )?;

        registry.register(Box::new(fetch_duration.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(poll_cycles.clone()))?;
        registry.register(Box::new(write_failures.clone()))?;
        registry.register(Box::new(last_successful_write.clone()))?;

        // 预先创建所有 outcome 序列，保证从 0 开始导出
        for outcome in PollOutcome::ALL {
            poll_cycles.with_label_values(&[outcome.as_label()]);
        }

        Ok(Self {
            registry,
            fetch_duration,
            fetch_failures,
            poll_cycles,
            write_failures,
            last_successful_write,
        })
    }


    /// 导出 Prometheus 文本格式的指标
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.get()
    }

    pub fn fetch_observations(&self) -> u64 {
        self.fetch_duration.get_sample_count()
    }

    pub fn outcome_count(&self, outcome: PollOutcome) -> u64 {
        self.poll_cycles.with_label_values(&[outcome.as_label()]).get()
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.get()
    }
}

impl MetricsSink for DiscoveryMetrics {
    fn observe_fetch_latency(&self, elapsed: Duration) {
        self.fetch_duration.observe(elapsed.as_secs_f64());
    }

    fn increment_fetch_failure(&self) {
        self.fetch_failures.inc();
    }

    fn record_outcome(&self, outcome: PollOutcome) {
        self.poll_cycles
            .with_label_values(&[outcome.as_label()])
            .inc();
    }

    fn record_write(&self, success: bool) {
        if success {
            self.last_successful_write
                .set(chrono::Utc::now().timestamp());
        } else {
            self.write_failures.inc();
        }
    }
}
