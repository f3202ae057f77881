//! 服务组装模块
//!
//! - [`poller`]：根据配置组装服务发现轮询器
//! - [`metrics`]：Prometheus 指标与健康检查 HTTP 端点

pub mod metrics;
pub mod poller;

pub use metrics::MetricsServer;
pub use poller::build_poller;
