//! OpenTelemetry tracing configuration
//!
//! Only consulted when the binary is built with the `opentelemetry` feature.

use serde::{Deserialize, Serialize};

fn default_service_name() -> String {
    "sdpoller".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:4317".to_string()
}

/// OTLP span export settings (`[observability.tracing]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Enable tracing (default: false)
    #[serde(default)]
    pub enable: bool,

    /// Service name attached to exported spans
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP gRPC endpoint, e.g. `http://otel-collector:4317`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            service_name: default_service_name(),
            endpoint: default_endpoint(),
        }
    }
}

impl TracingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.enable {
            if self.endpoint.trim().is_empty() {
                return Err("Tracing endpoint cannot be empty when tracing is enabled".to_string());
            }
            if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
                return Err("Tracing endpoint must start with http:// or https://".to_string());
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}
