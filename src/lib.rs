//! # sdpoller
//!
//! 服务发现轮询器：定期从 HTTP 端点拉取 Prometheus file_sd 目标列表，
//! 校验后写入本地文件，并通过 HTTP 暴露自身的运行指标。

pub mod lifecycle;
pub mod service;

// Re-export commonly used types
pub use lifecycle::{LifecycleState, ShutdownController};
pub use sdpoller_common::config::SdPollerConfig;
pub use service::{MetricsServer, build_poller};
