//! 统一配置管理系统
//!
//! sdpoller 所有配置项的定义、默认值与校验都在这里统一管理。
//! 配置来源按优先级从低到高：内置默认值 → TOML 文件 → 命令行参数 / 环境变量。
//! 进程启动时读取一次，之后不再变化。

pub mod metrics;
pub mod tracing;

pub use crate::config::metrics::MetricsConfig;
pub use crate::config::tracing::TracingConfig;
use crate::error::ConfigError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref LABEL_NAME: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    static ref METRIC_SUBSYSTEM: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
}

/// 未显式指定配置文件时依次尝试的位置
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["sdpoller.toml", "/etc/sdpoller/config.toml"];

/// 单次请求的默认超时（秒）
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

/// 轮询间隔上限（秒），一年
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// sdpoller 主配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SdPollerConfig {
    /// 服务发现端点 URL（必填，无默认值）
    #[serde(default)]
    pub target_url: String,

    /// 轮询间隔（秒），必须为正整数
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// 目标文件路径（必填），即 Prometheus file_sd 读取的文件
    #[serde(
        default,
        serialize_with = "serialize_pathbuf",
        deserialize_with = "deserialize_pathbuf"
    )]
    pub file_destination: PathBuf,

    /// 单次 HTTP 请求的客户端超时（秒），独立于轮询间隔
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// 指标名前缀（Prometheus subsystem）
    ///
    /// 例如 `payments` 会生成 `payments_durations_histogram_seconds`。
    #[serde(default = "default_metric_subsystem")]
    pub metric_subsystem: String,

    /// 附加到每个 target group 的静态标签
    #[serde(default)]
    pub static_labels: BTreeMap<String, String>,

    /// 写入前是否把静态标签合并进每个 target group（默认开启）
    #[serde(default = "default_true")]
    pub merge_static_labels: bool,

    /// 先写临时文件再 rename 替换目标文件（默认开启）
    #[serde(default = "default_true")]
    pub atomic_write: bool,

    /// PID 文件路径（可选）
    pub pid: Option<String>,

    /// 指标端点配置
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// 可观测性配置（日志 + 追踪）
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别，支持 EnvFilter 语法（如 "info,reqwest=warn"）
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,

    /// OpenTelemetry 追踪配置，需要编译时启用 `opentelemetry` feature
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// "console"（默认）或 "file"
    #[serde(default = "default_log_output")]
    pub output: String,

    /// output = "file" 时按天轮转
    #[serde(default)]
    pub rotate: bool,

    /// output = "file" 时的日志目录
    #[serde(default = "default_log_path")]
    pub path: String,
}

/// 命令行 / 环境变量提供的覆盖项
///
/// `None` 表示未指定，保留文件中的值。
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub target_url: Option<String>,
    pub interval_secs: Option<u64>,
    pub file_destination: Option<PathBuf>,
    pub fetch_timeout_secs: Option<u64>,
    pub metric_subsystem: Option<String>,
    pub static_labels: Vec<(String, String)>,
    pub metrics_port: Option<u16>,
    pub disable_metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

impl Default for SdPollerConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            interval_secs: default_interval_secs(),
            file_destination: PathBuf::new(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            metric_subsystem: default_metric_subsystem(),
            static_labels: BTreeMap::new(),
            merge_static_labels: true,
            atomic_write: true,
            pid: None,
            metrics: MetricsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_interval_secs() -> u64 {
    1
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_metric_subsystem() -> String {
    "promregator_discovery".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

fn serialize_pathbuf<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    path.display().to_string().serialize(serializer)
}

fn deserialize_pathbuf<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(PathBuf::from(s))
}

/// 解析 `key:value` 形式的静态标签
///
/// 只在第一个冒号处切分，值中可以包含冒号。
pub fn parse_static_label(raw: &str) -> Result<(String, String), ConfigError> {
    let (key, value) = raw
        .split_once(':')
        .ok_or_else(|| ConfigError::invalid_value("label", format!("'{raw}' is not key:value")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::invalid_value(
            "label",
            format!("'{raw}' has an empty key"),
        ));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

impl SdPollerConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if !path_ref.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path_ref.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 定位并加载配置文件
    ///
    /// 显式给出的路径必须存在；未给出时依次尝试 [`DEFAULT_CONFIG_PATHS`]，
    /// 都不存在则返回默认配置（完全依赖命令行参数）。
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.is_file() {
                return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
            }
        }

        Ok((Self::default(), None))
    }

    /// 应用命令行 / 环境变量覆盖项
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.target_url {
            self.target_url = url;
        }
        if let Some(interval) = overrides.interval_secs {
            self.interval_secs = interval;
        }
        if let Some(path) = overrides.file_destination {
            self.file_destination = path;
        }
        if let Some(timeout) = overrides.fetch_timeout_secs {
            self.fetch_timeout_secs = timeout;
        }
        if let Some(subsystem) = overrides.metric_subsystem {
            self.metric_subsystem = subsystem;
        }
        for (key, value) in overrides.static_labels {
            self.static_labels.insert(key, value);
        }
        if let Some(port) = overrides.metrics_port {
            self.metrics.port = port;
        }
        if overrides.disable_metrics {
            self.metrics.enable = false;
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// 实际需要合并的静态标签；未开启合并或标签为空时返回 `None`
    pub fn effective_static_labels(&self) -> Option<&BTreeMap<String, String>> {
        if self.merge_static_labels && !self.static_labels.is_empty() {
            Some(&self.static_labels)
        } else {
            None
        }
    }

    /// 返回可观测性配置引用
    pub fn observability_config(&self) -> &ObservabilityConfig {
        &self.observability
    }

    /// 获取追踪配置
    pub fn tracing_config(&self) -> &TracingConfig {
        &self.observability.tracing
    }

    /// 验证配置有效性
    ///
    /// 以 `Warning:` 开头的条目不影响启动，其余条目都是致命错误。
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.target_url.trim().is_empty() {
            errors.push(
                "target_url is required (--target-url or TARGET_URL), no default is provided"
                    .to_string(),
            );
        } else {
            match url::Url::parse(&self.target_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(format!(
                    "Invalid target_url '{}': unsupported scheme '{}'",
                    self.target_url,
                    url.scheme()
                )),
                Err(e) => errors.push(format!("Invalid target_url '{}': {e}", self.target_url)),
            }
        }

        if self.interval_secs == 0 {
            errors.push("interval_secs must be a positive integer".to_string());
        } else if self.interval_secs > MAX_INTERVAL_SECS {
            errors.push(format!(
                "interval_secs ({}) exceeds the maximum of {MAX_INTERVAL_SECS} (one year)",
                self.interval_secs
            ));
        }

        if self.file_destination.as_os_str().is_empty() {
            errors.push(
                "file_destination is required (--file-destination or FILE_DESTINATION)"
                    .to_string(),
            );
        } else if self.file_destination.is_dir() {
            errors.push(format!(
                "file_destination {:?} is a directory, expected a file path",
                self.file_destination
            ));
        }

        if self.fetch_timeout_secs == 0 {
            errors.push("fetch_timeout_secs must be a positive integer".to_string());
        } else if self.interval_secs > 0 && self.fetch_timeout_secs >= self.interval_secs {
            errors.push(format!(
                "Warning: fetch_timeout_secs ({}) >= interval_secs ({}), slow fetches will cause ticks to be skipped",
                self.fetch_timeout_secs, self.interval_secs
            ));
        }

        if !self.metric_subsystem.is_empty() && !METRIC_SUBSYSTEM.is_match(&self.metric_subsystem)
        {
            errors.push(format!(
                "Invalid metric_subsystem '{}', must match [a-zA-Z_][a-zA-Z0-9_]*",
                self.metric_subsystem
            ));
        }

        for key in self.static_labels.keys() {
            if !LABEL_NAME.is_match(key) {
                errors.push(format!(
                    "Invalid static label name '{key}', must match [a-zA-Z_][a-zA-Z0-9_]*"
                ));
            }
        }
        if !self.static_labels.is_empty() && !self.merge_static_labels {
            errors.push(
                "Warning: static_labels are configured but merge_static_labels = false, they will not be written"
                    .to_string(),
            );
        }

        {
            let main_level = self
                .observability
                .filter_level
                .split(',')
                .next()
                .unwrap_or("")
                .trim();
            if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
                errors.push(format!(
                    "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                    self.observability.filter_level
                ));
            }
        }

        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if let Err(e) = self.observability.tracing.validate() {
            errors.push(format!("Tracing configuration error: {e}"));
        }

        if let Err(e) = self.metrics.validate() {
            errors.push(format!("Metrics configuration error: {e}"));
        }
        if !self.metrics.enable {
            errors.push(
                "Warning: metrics endpoint is disabled, fetch failures will not be observable"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 只保留致命问题；没有致命问题时返回 `Ok`
    pub fn validate_strict(&self) -> Result<(), ConfigError> {
        match self.validate() {
            Ok(()) => Ok(()),
            Err(problems) => {
                let fatal: Vec<String> = problems
                    .into_iter()
                    .filter(|p| !p.starts_with("Warning:"))
                    .collect();
                if fatal.is_empty() {
                    Ok(())
                } else {
                    Err(ConfigError::Invalid { problems: fatal })
                }
            }
        }
    }
}
