//! 轮询器组装

use discovery::{HttpFetcher, Persister, Poller, PollerError};
use sdpoller_common::{DiscoveryMetrics, MetricsSink, SdPollerConfig};
use std::sync::Arc;
use tracing::info;

/// 根据配置组装 HTTP 轮询器
///
/// 配置应已通过校验；这里只会因 URL 或 HTTP 客户端构建失败而报错。
pub fn build_poller(
    config: &SdPollerConfig,
    metrics: Arc<DiscoveryMetrics>,
) -> Result<Poller<HttpFetcher>, PollerError> {
    let sink: Arc<dyn MetricsSink> = metrics;
    let fetcher = HttpFetcher::new(&config.target_url, config.fetch_timeout(), sink.clone())?;
    let persister = Persister::new(config.file_destination.clone(), config.atomic_write);
    let mut poller = Poller::new(fetcher, persister, sink, config.interval())?;

    if let Some(labels) = config.effective_static_labels() {
        info!("Merging {} static label(s) into every target group", labels.len());
        poller = poller.with_static_labels(labels.clone());
    }

    Ok(poller)
}
