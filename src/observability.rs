//! 日志与追踪初始化
//!
//! 订阅器由 EnvFilter 加一组 layer 构成：fmt 输出（控制台或文件）始终存在，
//! 编译时启用 `opentelemetry` feature 且配置中打开追踪时再追加 OTLP 导出层。

use crate::error::Result;
use sdpoller_common::SdPollerConfig;
use sdpoller_common::config::LogConfig;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

#[cfg(feature = "opentelemetry")]
use opentelemetry_sdk::trace::SdkTracerProvider;

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// 持有日志写入线程与 tracer provider
///
/// 必须活得比轮询循环久：drop 时刷新文件日志并关闭 OTLP 导出。
#[derive(Default)]
pub struct ObservabilityGuard {
    #[cfg(feature = "opentelemetry")]
    tracer_provider: Option<SdkTracerProvider>,
    _log_writer: Option<WorkerGuard>,
}

#[cfg(feature = "opentelemetry")]
impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown tracer provider: {e:?}");
        }
    }
}

pub fn init_observability(config: &SdPollerConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();
    let observability = config.observability_config();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let log_file = match observability.log.output.as_str() {
        "file" => {
            let (writer, path, worker) = file_writer(&observability.log, &config.metric_subsystem)?;
            guard._log_writer = Some(worker);
            layers.push(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(path)
        }
        _ => {
            layers.push(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stdout)
                    .boxed(),
            );
            None
        }
    };

    #[cfg(feature = "opentelemetry")]
    if let Some(provider) = otlp::tracer_provider(config)? {
        use opentelemetry::trace::TracerProvider as _;
        let tracer = provider.tracer(config.tracing_config().service_name().to_string());
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
        guard.tracer_provider = Some(provider);
    }

    tracing_subscriber::registry()
        .with(env_filter(&observability.filter_level))
        .with(layers)
        .try_init()
        .map_err(|e| crate::error::Error::custom(format!("日志系统初始化失败: {e}")))?;

    info!(
        target_url = %config.target_url,
        file_destination = ?config.file_destination,
        log_file = ?log_file,
        "Logging initialized"
    );
    Ok(guard)
}

/// RUST_LOG 优先；未设置或无法解析时使用配置中的 filter_level
fn env_filter(configured: &str) -> EnvFilter {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|directive| !directive.trim().is_empty())
        .and_then(|directive| EnvFilter::try_new(directive).ok());
    if let Some(filter) = from_env {
        return filter;
    }

    EnvFilter::try_new(configured).unwrap_or_else(|e| {
        bootstrap_error!("⚠️  无法解析日志过滤指令 '{}': {}，使用 info", configured, e);
        EnvFilter::new("info")
    })
}

/// 日志文件名带上 metric_subsystem，同一目录下的多个实例互不覆盖
fn log_file_name(metric_subsystem: &str) -> String {
    if metric_subsystem.is_empty() {
        "sdpoller.log".to_string()
    } else {
        format!("sdpoller-{metric_subsystem}.log")
    }
}

fn file_writer(
    log: &LogConfig,
    metric_subsystem: &str,
) -> Result<(NonBlocking, PathBuf, WorkerGuard)> {
    let dir = Path::new(&log.path);
    fs::create_dir_all(dir)?;
    let file_name = log_file_name(metric_subsystem);
    let path = dir.join(&file_name);

    let (writer, worker) = if log.rotate {
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, &file_name))
    } else {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing_appender::non_blocking(file)
    };

    bootstrap_info!(
        "📝 日志写入 {:?}{}",
        path,
        if log.rotate { "（按天轮转）" } else { "" }
    );
    Ok((writer, path, worker))
}

#[cfg(feature = "opentelemetry")]
mod otlp {
    use crate::error::{Error, Result};
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
    use sdpoller_common::SdPollerConfig;

    /// 追踪关闭时返回 `None`
    pub(super) fn tracer_provider(config: &SdPollerConfig) -> Result<Option<SdkTracerProvider>> {
        let tracing_cfg = config.tracing_config();
        if !tracing_cfg.is_enabled() {
            return Ok(None);
        }
        tracing_cfg.validate().map_err(Error::custom)?;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(tracing_cfg.endpoint())
            .build()
            .map_err(|e| Error::custom(format!("Failed to build OTLP exporter: {e}")))?;

        // 每个实例只轮询一个端点，把它放进 resource 便于区分
        let resource = Resource::builder()
            .with_service_name(tracing_cfg.service_name().to_string())
            .with_attributes([
                KeyValue::new("sdpoller.target_url", config.target_url.clone()),
                KeyValue::new(
                    "sdpoller.file_destination",
                    config.file_destination.display().to_string(),
                ),
                KeyValue::new("sdpoller.metric_subsystem", config.metric_subsystem.clone()),
            ])
            .build();

        let provider = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build();
        opentelemetry::global::set_tracer_provider(provider.clone());
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

        bootstrap_info!(
            "📊 OTLP 追踪导出到 {} (service_name={})",
            tracing_cfg.endpoint(),
            tracing_cfg.service_name()
        );
        Ok(Some(provider))
    }
}
