//! Metrics exposition endpoint configuration

use serde::{Deserialize, Serialize};

fn default_enable() -> bool {
    true
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/metrics".to_string()
}

/// Prometheus 指标 HTTP 端点配置 (`[metrics]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// 是否启动指标 HTTP 服务（默认启用）
    #[serde(default = "default_enable")]
    pub enable: bool,

    /// 监听地址
    #[serde(default = "default_ip")]
    pub ip: String,

    /// 监听端口，可被 `PORT` 环境变量覆盖
    #[serde(default = "default_port")]
    pub port: u16,

    /// 指标路径
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            ip: default_ip(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl MetricsConfig {
    /// `ip:port` 形式的绑定地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.enable {
            return Ok(());
        }
        if self.ip.parse::<std::net::IpAddr>().is_err() {
            return Err(format!(
                "Invalid metrics ip '{}', must be a valid IP address",
                self.ip
            ));
        }
        if !self.path.starts_with('/') {
            return Err(format!(
                "Invalid metrics path '{}', must start with '/'",
                self.path
            ));
        }
        if self.path == "/health" {
            return Err(
                "Invalid metrics path '/health', it is reserved for the health check".to_string(),
            );
        }
        Ok(())
    }
}
