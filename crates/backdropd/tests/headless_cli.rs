use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn backdropd(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_backdropd"));
    command
        .env("BACKDROP_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn headless_json_report_shows_a_clean_teardown() {
    let root = TempDir::new().unwrap();
    let output = backdropd(root.path())
        .args(["--headless", "30", "--json", "--theme", "ink"])
        .output()
        .expect("failed to run backdropd --headless");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["theme"], "ink");
    assert_eq!(report["active"], true);
    assert_eq!(report["particles"], 18_000);
    assert_eq!(report["frames_rendered"], 31);
    assert_eq!(report["live_resources"], 0);
    assert_eq!(report["pending_frames"], 0);
}

#[test]
fn config_file_supplies_theme_and_signals() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("backdrop.toml"),
        r#"
version = 1

[defaults]
theme = "starfield"
seed = 7
throttle_interval = "250ms"

[signals]
reduced_motion = true
"#,
    )
    .unwrap();

    let output = backdropd(root.path())
        .args(["--headless", "3", "--json"])
        .output()
        .expect("failed to run backdropd with a config file");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["theme"], "starfield");
    assert_eq!(report["seed"], 7);
    assert_eq!(report["reduced_motion"], true);
    assert_eq!(report["throttle_ms"], 250);
    assert_eq!(report["particles"], 700);
}

#[test]
fn invalid_config_fails_before_mounting() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("custom.toml");
    fs::write(&config, "version = 1\n[ocean]\nelevation = 120\n").unwrap();

    let output = backdropd(root.path())
        .arg("--config")
        .arg(&config)
        .args(["--headless", "1"])
        .output()
        .expect("failed to run backdropd with an invalid config");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("elevation"));
}

#[test]
fn config_where_reports_missing_file() {
    let root = TempDir::new().unwrap();
    let output = backdropd(root.path())
        .args(["config", "where"])
        .output()
        .expect("failed to run backdropd config where");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("backdrop.toml"));
    assert!(stdout.contains("missing"));
}
