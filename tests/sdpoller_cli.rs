use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

const OVERRIDE_ENV: [&str; 7] = [
    "TARGET_URL",
    "INTERVAL",
    "FILE_DESTINATION",
    "METRIC_SUBSYSTEM",
    "STATIC_LABELS",
    "FETCH_TIMEOUT",
    "PORT",
];

fn write_config(dir: &Path, file_name: &str, body: &str) -> PathBuf {
    let config_path = dir.join(file_name);
    fs::write(&config_path, body).expect("write config");
    config_path
}

fn write_valid_config(dir: &Path, file_name: &str) -> PathBuf {
    write_config(
        dir,
        file_name,
        &format!(
            r#"
target_url = "http://127.0.0.1:9/discovery"
interval_secs = 10
file_destination = "{dest}"
metric_subsystem = "cli_test"

[static_labels]
env = "test"

[observability.log]
output = "console"
"#,
            dest = dir.join("targets.json").display()
        ),
    )
}

fn run_sdpoller(args: &[&str], current_dir: &Path) -> Output {
    let mut cmd = Command::new(PathBuf::from(env!("CARGO_BIN_EXE_sdpoller")));
    cmd.args(args).current_dir(current_dir);
    for var in OVERRIDE_ENV {
        cmd.env_remove(var);
    }
    cmd.output().expect("run sdpoller command")
}

fn combined_output(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn sdpoller_test_command_accepts_explicit_valid_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_valid_config(temp.path(), "valid.toml");
    let output = run_sdpoller(
        &["test", config_path.to_str().expect("utf8 path")],
        temp.path(),
    );

    assert!(
        output.status.success(),
        "command should succeed, output: {}",
        combined_output(&output)
    );
}

#[test]
fn sdpoller_test_command_finds_default_config_in_current_directory() {
    let temp = tempfile::tempdir().expect("temp dir");
    write_valid_config(temp.path(), "sdpoller.toml");
    let output = run_sdpoller(&["test"], temp.path());

    assert!(
        output.status.success(),
        "command should succeed, output: {}",
        combined_output(&output)
    );
}

#[test]
fn sdpoller_test_command_accepts_flags_without_config_file() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_sdpoller(
        &[
            "test",
            "--target-url",
            "http://127.0.0.1:9/discovery",
            "--file-destination",
            "targets.json",
        ],
        temp.path(),
    );

    assert!(
        output.status.success(),
        "command should succeed, output: {}",
        combined_output(&output)
    );
}

#[test]
fn sdpoller_test_command_allows_warning_only_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    // fetch timeout >= interval is only a warning
    let config_path = write_config(
        temp.path(),
        "warning.toml",
        r#"
target_url = "http://127.0.0.1:9/discovery"
interval_secs = 2
fetch_timeout_secs = 5
file_destination = "targets.json"
"#,
    );
    let output = run_sdpoller(
        &["test", config_path.to_str().expect("utf8 path")],
        temp.path(),
    );

    assert!(
        output.status.success(),
        "warnings must not fail the check, output: {}",
        combined_output(&output)
    );
}

#[test]
fn sdpoller_test_command_rejects_missing_target_url() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(
        temp.path(),
        "no-target.toml",
        r#"
file_destination = "targets.json"
"#,
    );
    let output = run_sdpoller(
        &["test", config_path.to_str().expect("utf8 path")],
        temp.path(),
    );

    assert!(!output.status.success());
    assert!(
        combined_output(&output).contains("target_url"),
        "expected target_url hint, output: {}",
        combined_output(&output)
    );
}

#[test]
fn sdpoller_test_command_rejects_unparseable_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "broken.toml", "interval_secs = \"soon\"\n");
    let output = run_sdpoller(
        &["test", config_path.to_str().expect("utf8 path")],
        temp.path(),
    );

    assert!(!output.status.success());
}

#[test]
fn sdpoller_refuses_to_start_without_target_url() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_sdpoller(&["--file-destination", "targets.json"], temp.path());

    assert!(!output.status.success());
    assert!(
        combined_output(&output).contains("target_url"),
        "expected target_url hint, output: {}",
        combined_output(&output)
    );
    assert!(!temp.path().join("targets.json").exists());
}

#[test]
fn sdpoller_refuses_to_start_with_zero_interval() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_sdpoller(
        &[
            "--target-url",
            "http://127.0.0.1:9/discovery",
            "--file-destination",
            "targets.json",
            "--interval",
            "0",
        ],
        temp.path(),
    );

    assert!(!output.status.success());
    assert!(
        combined_output(&output).contains("interval"),
        "expected interval hint, output: {}",
        combined_output(&output)
    );
}

#[test]
fn sdpoller_refuses_missing_explicit_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_sdpoller(&["--config", "does-not-exist.toml"], temp.path());

    assert!(!output.status.success());
    assert!(combined_output(&output).contains("does-not-exist.toml"));
}

#[test]
fn sdpoller_refuses_to_start_with_unschedulable_interval() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_sdpoller(
        &[
            "--target-url",
            "http://127.0.0.1:9/discovery",
            "--file-destination",
            "targets.json",
            "--interval",
            &u64::MAX.to_string(),
            "--no-metrics",
        ],
        temp.path(),
    );

    assert!(!output.status.success());
    assert!(
        combined_output(&output).contains("exceeds the maximum"),
        "expected interval bound hint, output: {}",
        combined_output(&output)
    );
}
