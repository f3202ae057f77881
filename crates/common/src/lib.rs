//! sdpoller 基础设施库
//!
//! 为服务发现轮询器提供配置、指标与共享类型

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{ConfigOverrides, SdPollerConfig};
pub use error::{ConfigError, Result};
pub use metrics::{DiscoveryMetrics, MetricsSink};
pub use types::PollOutcome;
