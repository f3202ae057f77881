//! sdpoller 主程序
//!
//! 加载配置，启动服务发现轮询器与指标端点，收到 SIGTERM / SIGINT 后优雅退出

// 日志系统初始化之前使用的输出宏，子模块同样可用
macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

mod cli;
mod error;
mod observability;
mod process;

use clap::Parser;
use discovery::PollerError;
use observability::init_observability;
use sdpoller::{MetricsServer, ShutdownController, build_poller};
use sdpoller_common::{DiscoveryMetrics, SdPollerConfig};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use tracing::{error, info};

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path = config_file.as_deref().or(cli.config.as_deref());
            ApplicationLauncher::test_config(config_path, &cli)
        }
        None => {
            let config = ApplicationLauncher::load_config(cli.config.as_deref(), &cli)?;

            // Create Tokio runtime（before running the application）
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_application(config))
        }
    }
}

impl ApplicationLauncher {
    /// 加载配置文件并合并命令行 / 环境变量覆盖项
    fn read_config(config_path: Option<&Path>, cli: &Cli) -> Result<SdPollerConfig> {
        let (mut config, loaded_from) = SdPollerConfig::load(config_path).inspect_err(|e| {
            bootstrap_error!("❌ 配置加载失败: {}", e);
        })?;

        match loaded_from {
            Some(path) => {
                bootstrap_info!("📄 加载配置文件: {:?}", path);
            }
            None => {
                bootstrap_info!("📄 未找到配置文件，使用命令行参数与环境变量");
            }
        }

        config.apply_overrides(cli.overrides.to_overrides());
        Ok(config)
    }

    /// 加载并验证配置，存在致命问题时拒绝启动
    fn load_config(config_path: Option<&Path>, cli: &Cli) -> Result<SdPollerConfig> {
        let config = Self::read_config(config_path, cli)?;

        if let Err(errors) = config.validate() {
            bootstrap_error!("❌ 配置验证发现问题:");
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                }
            }
        }
        config.validate_strict()?;

        bootstrap_info!("✅ 配置加载成功");
        Ok(config)
    }

    /// 测试配置文件是否有效
    fn test_config(config_path: Option<&Path>, cli: &Cli) -> Result<()> {
        // Initialize basic logging for test command
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();

        let config = match Self::read_config(config_path, cli) {
            Ok(config) => {
                info!("✅ 配置解析成功");
                config
            }
            Err(e) => {
                error!("❌ 配置解析失败: {}", e);
                return Err(Error::service_validation(format!("配置解析失败: {e}")));
            }
        };

        if let Err(errors) = config.validate() {
            error!("❌ 配置验证发现问题:");
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    error!("  {}. ❌ {}", i + 1, err);
                }
            }
            let has_errors = errors.iter().any(|e| !e.starts_with("Warning:"));
            if has_errors {
                return Err(Error::service_validation("配置验证失败".to_string()));
            }
        }

        info!("✅ 配置验证通过");
        info!("  - target_url: {}", config.target_url);
        info!("  - interval: {:?}", config.interval());
        info!("  - file_destination: {:?}", config.file_destination);
        Ok(())
    }

    /// 运行应用程序的主入口
    async fn run_application(config: SdPollerConfig) -> Result<()> {
        // 初始化可观测性系统（日志 + 追踪）
        let _observability_guard = init_observability(&config)?;

        let _pid_file = config
            .pid
            .as_deref()
            .map(|path| process::PidFile::create(Path::new(path)))
            .transpose()?;

        Self::run_services(config).await
    }

    async fn run_services(config: SdPollerConfig) -> Result<()> {
        info!("🚀 启动服务发现轮询器");

        // 安装信号处理器，确保任何阶段都能触发关闭
        let controller = ShutdownController::new();
        let signal_handle = controller.listen_for_signals()?;

        let metrics = Arc::new(DiscoveryMetrics::new(&config.metric_subsystem)?);
        let poller = build_poller(&config, metrics.clone())?;

        let mut handles = Vec::new();
        if config.metrics.enable {
            let server = MetricsServer::bind(
                &config.metrics.bind_addr(),
                &config.metrics.path,
                metrics.clone(),
                poller.subscribe(),
            )
            .await
            .map_err(|e| Error::service_startup(format!("指标服务启动失败: {e}")))?;
            info!(
                "📡 指标端点: http://{}{}",
                config.metrics.bind_addr(),
                config.metrics.path
            );
            handles.push(("metrics", server.spawn(controller.token())));
        } else {
            info!("指标端点已禁用");
        }

        info!(
            "✅ 轮询 {} 每 {:?} 一次，写入 {:?}",
            config.target_url,
            config.interval(),
            config.file_destination
        );
        let poller_handle = poller.spawn(controller.token());

        let result = Self::wait_for_tasks(&controller, poller_handle, handles).await;
        signal_handle.abort();

        if result.is_ok() {
            info!("🛑 服务发现轮询器已安全关闭");
        }
        result
    }

    /// 等待轮询器退出后关闭其余任务
    ///
    /// 轮询器正常情况下只会因关闭请求而退出；panic 或启动失败都作为错误返回，
    /// 不能当作正常关闭。
    async fn wait_for_tasks(
        controller: &ShutdownController,
        poller: JoinHandle<std::result::Result<(), PollerError>>,
        handles: Vec<(&'static str, JoinHandle<()>)>,
    ) -> Result<()> {
        let poller_result = controller.join("poller", poller).await;
        controller.shutdown();

        let mut task_error = None;
        for (name, handle) in handles {
            if let Err(e) = controller.join(name, handle).await {
                task_error.get_or_insert(e);
            }
        }

        poller_result??;
        match task_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
