//! 进程生命周期管理
//!
//! 所有后台任务共享同一个 [`CancellationToken`]；收到 SIGTERM / SIGINT
//! 或内部调用 [`ShutdownController::shutdown`] 时取消该 token。

use strum::Display;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 进程生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LifecycleState {
    Running,
    ShuttingDown,
}

/// 全局关闭控制器
#[derive(Debug, Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 供后台任务监听的关闭 token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> LifecycleState {
        if self.token.is_cancelled() {
            LifecycleState::ShuttingDown
        } else {
            LifecycleState::Running
        }
    }

    /// 请求关闭；重复调用无副作用
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
            self.token.cancel();
        }
    }

    /// 安装 SIGTERM / SIGINT 处理器
    ///
    /// 信号注册在调用时同步完成，返回的任务在收到第一个信号或 token
    /// 被取消后结束。
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let controller = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("收到 SIGTERM 信号，开始优雅关闭...");
                    controller.shutdown();
                }
                _ = sigint.recv() => {
                    info!("收到 SIGINT 信号，开始优雅关闭...");
                    controller.shutdown();
                }
                _ = controller.token.cancelled() => {}
            }
        }))
    }

    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> std::io::Result<JoinHandle<()>> {
        let controller = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("无法监听Ctrl-C信号: {}", e);
                        return;
                    }
                    info!("收到Ctrl-C信号，开始优雅关闭...");
                    controller.shutdown();
                }
                _ = controller.token.cancelled() => {}
            }
        }))
    }

    /// 等待任务结束；任务 panic 或被取消时触发全局关闭，并把错误交给调用方
    pub async fn join<T>(&self, name: &str, handle: JoinHandle<T>) -> Result<T, JoinError> {
        let result = handle.await;
        if let Err(e) = &result {
            error!("{} task terminated unexpectedly: {}", name, e);
            self.shutdown();
        }
        result
    }
}
