//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和选项。除 `--config` 外的参数都可以通过环境变量提供，
//! 优先级高于配置文件。
use clap::{Args, Parser, Subcommand};
use sdpoller_common::ConfigOverrides;
use sdpoller_common::config::parse_static_label;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sdpoller")]
#[command(version)]
#[command(
    about = "Polls a service discovery endpoint and keeps a Prometheus file_sd target file up to date"
)]
#[command(after_help = LEGACY_FLAGS_HELP)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) overrides: OverrideArgs,
}

/// 旧部署脚本使用单横线的 camelCase 参数
const LEGACY_FLAGS_HELP: &str = "\
Legacy flag names --targetURL, --fileDestination and --metricSubsystem are accepted \
as aliases. They need two dashes: single-dash forms such as -targetURL=... are rejected.";

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to --config or standard locations)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },
}

/// 覆盖配置文件的参数
#[derive(Args, Debug, Default)]
pub(crate) struct OverrideArgs {
    /// Discovery endpoint URL
    #[arg(long = "target-url", alias = "targetURL", env = "TARGET_URL", global = true)]
    pub(crate) target_url: Option<String>,

    /// Poll interval in seconds
    #[arg(long, env = "INTERVAL", global = true)]
    pub(crate) interval: Option<u64>,

    /// Path of the file_sd target file to maintain
    #[arg(
        long = "file-destination",
        alias = "fileDestination",
        env = "FILE_DESTINATION",
        global = true
    )]
    pub(crate) file_destination: Option<PathBuf>,

    /// Prefix of the exported metric names
    #[arg(
        long = "metric-subsystem",
        alias = "metricSubsystem",
        env = "METRIC_SUBSYSTEM",
        global = true
    )]
    pub(crate) metric_subsystem: Option<String>,

    /// Static label merged into every target group, as key:value (repeatable)
    #[arg(
        long = "label",
        env = "STATIC_LABELS",
        value_delimiter = ',',
        value_parser = parse_label_arg,
        global = true
    )]
    pub(crate) labels: Vec<(String, String)>,

    /// Fetch timeout in seconds
    #[arg(long = "fetch-timeout", env = "FETCH_TIMEOUT", global = true)]
    pub(crate) fetch_timeout: Option<u64>,

    /// Port of the metrics endpoint
    #[arg(long = "metrics-port", env = "PORT", global = true)]
    pub(crate) metrics_port: Option<u16>,

    /// Do not start the metrics endpoint
    #[arg(long = "no-metrics", global = true)]
    pub(crate) no_metrics: bool,
}

fn parse_label_arg(raw: &str) -> Result<(String, String), String> {
    parse_static_label(raw).map_err(|e| e.to_string())
}

impl OverrideArgs {
    pub(crate) fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            target_url: self.target_url.clone(),
            interval_secs: self.interval,
            file_destination: self.file_destination.clone(),
            fetch_timeout_secs: self.fetch_timeout,
            metric_subsystem: self.metric_subsystem.clone(),
            static_labels: self.labels.clone(),
            metrics_port: self.metrics_port,
            disable_metrics: self.no_metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_overrides() {
        let cli = Cli::try_parse_from([
            "sdpoller",
            "--target-url",
            "http://sd.local/discovery",
            "--interval",
            "10",
            "--file-destination",
            "/tmp/targets.json",
            "--label",
            "env:prod",
            "--label",
            "url:http://x:1",
        ])
        .unwrap();

        let overrides = cli.overrides.to_overrides();
        assert_eq!(
            overrides.target_url.as_deref(),
            Some("http://sd.local/discovery")
        );
        assert_eq!(overrides.interval_secs, Some(10));
        assert_eq!(
            overrides.file_destination,
            Some(PathBuf::from("/tmp/targets.json"))
        );
        assert_eq!(
            overrides.static_labels,
            vec![
                ("env".to_string(), "prod".to_string()),
                ("url".to_string(), "http://x:1".to_string()),
            ]
        );
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_accepts_legacy_flag_names() {
        let cli = Cli::try_parse_from([
            "sdpoller",
            "--targetURL",
            "http://sd.local",
            "--fileDestination",
            "out.json",
        ])
        .unwrap();
        assert_eq!(cli.overrides.target_url.as_deref(), Some("http://sd.local"));
        assert_eq!(
            cli.overrides.file_destination,
            Some(PathBuf::from("out.json"))
        );
    }

    #[test]
    fn test_single_dash_legacy_flags_are_rejected_with_hint() {
        let cli = Cli::try_parse_from(["sdpoller", "--targetURL=http://sd.local"]).unwrap();
        assert_eq!(cli.overrides.target_url.as_deref(), Some("http://sd.local"));

        assert!(Cli::try_parse_from(["sdpoller", "-targetURL=http://sd.local"]).is_err());

        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("-targetURL=... are rejected"));
    }

    #[test]
    fn test_rejects_malformed_label() {
        assert!(Cli::try_parse_from(["sdpoller", "--label", "no-colon"]).is_err());
        assert!(Cli::try_parse_from(["sdpoller", "--label", ":value"]).is_err());
    }

    #[test]
    fn test_test_subcommand() {
        let cli = Cli::try_parse_from(["sdpoller", "test", "custom.toml"]).unwrap();
        match cli.command {
            Some(Commands::Test { config_file }) => {
                assert_eq!(config_file, Some(PathBuf::from("custom.toml")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
