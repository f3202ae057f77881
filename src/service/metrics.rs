//! Prometheus 指标 HTTP 端点
//!
//! 暴露 `<path>`（Prometheus 文本格式）与 `/health`（轮询器状态 JSON）。

use anyhow::Result;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use discovery::PollerState;
use sdpoller_common::DiscoveryMetrics;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};

#[derive(Clone)]
struct MetricsState {
    metrics: Arc<DiscoveryMetrics>,
    poller: watch::Receiver<PollerState>,
}

/// 已绑定端口、尚未开始服务的指标服务器
pub struct MetricsServer {
    listener: TcpListener,
    router: Router,
}

impl MetricsServer {
    /// 绑定监听地址
    ///
    /// 绑定失败直接返回错误，由调用方决定是否终止启动。
    pub async fn bind(
        bind_addr: &str,
        path: &str,
        metrics: Arc<DiscoveryMetrics>,
        poller: watch::Receiver<PollerState>,
    ) -> Result<Self> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{bind_addr}': {e}"))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to address '{addr}': {e}"))?;

        Ok(Self {
            listener,
            router: router(path, metrics, poller),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 在后台运行服务器，`shutdown` 取消后优雅退出
    ///
    /// 服务器异常退出时同样会取消 `shutdown`，使整个进程一起停止。
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let Self { listener, router } = self;

        tokio::spawn(async move {
            let addr = listener.local_addr().ok();
            info!("Metrics server listening on {:?}", addr);

            let signal = shutdown.clone();
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                signal.cancelled().await;
                info!("Metrics server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("Metrics server error: {}", e);
                shutdown.cancel();
            }
            info!("Metrics server stopped");
        })
    }
}

fn router(
    path: &str,
    metrics: Arc<DiscoveryMetrics>,
    poller: watch::Receiver<PollerState>,
) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                info_span!(
                    "http.request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version()
                )
            }),
        )
        .with_state(MetricsState { metrics, poller })
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<MetricsState>) -> Response {
    match state.metrics.export() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<MetricsState>) -> Response {
    let poller = *state.poller.borrow();
    let status = if poller == PollerState::Stopped {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(json!({
            "status": if status.is_success() { "healthy" } else { "stopped" },
            "service": "sdpoller",
            "poller": poller.to_string(),
        })),
    )
        .into_response()
}
