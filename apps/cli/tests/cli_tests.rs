//! rover-cli 命令行测试

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ROUTE: &str = r#"{
  "states": [
    { "x": 0, "y": 0, "heading": "NORTH" },
    { "x": 0, "y": 1, "heading": "NORTH" },
    { "x": 0, "y": 2, "heading": "NORTH", "snapshot_obstacle_id": 1 },
    { "x": 1, "y": 3, "heading": "EAST" }
  ],
  "obstacles": [
    { "id": 1, "x": 1, "y": 2, "facing": "SOUTH" }
  ]
}"#;

/// 缩短检测等待，保证模拟很快结束
const FAST_CONFIG: &str = r#"
[mission]
detection_timeout_ms = 500
match_settle_ms = 50
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn cli() -> Command {
    Command::cargo_bin("rover-cli").unwrap()
}

#[test]
fn test_compile_prints_commands_and_segments() {
    let dir = TempDir::new().unwrap();
    let route = write(&dir, "route.json", ROUTE);

    cli()
        .args(["compile", "--route"])
        .arg(&route)
        .assert()
        .success()
        .stdout(predicate::str::contains("Move(Forward, 20)"))
        .stdout(predicate::str::contains("Snapshot(1, Right)"))
        .stdout(predicate::str::contains("Turn(Right, 90, Forward)"))
        .stdout(predicate::str::contains("Segments (2):"))
        .stdout(predicate::str::contains("-> obstacle 1 (R)"));
}

#[test]
fn test_compile_json_output() {
    let dir = TempDir::new().unwrap();
    let route = write(&dir, "route.json", ROUTE);

    let output = cli()
        .args(["compile", "--json", "--route"])
        .arg(&route)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["plan"]["segments"].as_array().unwrap().len(), 2);
    assert_eq!(value["route"]["commands"].as_array().unwrap().len(), 4);
}

#[test]
fn test_compile_rejects_unknown_obstacle() {
    let dir = TempDir::new().unwrap();
    let route = write(&dir, "route.json", &ROUTE.replace("\"id\": 1", "\"id\": 7"));

    cli()
        .args(["compile", "--route"])
        .arg(&route)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to compile route"));
}

#[test]
fn test_config_show_defaults() {
    cli()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[mission]"))
        .stdout(predicate::str::contains("detection_timeout_ms = 2000"));
}

#[test]
fn test_config_check_rejects_invalid_file() {
    let dir = TempDir::new().unwrap();
    let bad = write(&dir, "bad.toml", "[mission]\nmotor_speed = 150\n");
    let good = write(&dir, "good.toml", FAST_CONFIG);

    cli().args(["config", "check"]).arg(&bad).assert().failure();
    cli()
        .args(["config", "check"])
        .arg(&good)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("mission.toml");

    cli().args(["config", "init"]).arg(&path).assert().success();
    assert!(path.exists());

    cli()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    cli()
        .args(["config", "init", "--force"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_simulate_matches_obstacle() {
    let dir = TempDir::new().unwrap();
    let route = write(&dir, "route.json", ROUTE);
    let config = write(&dir, "mission.toml", FAST_CONFIG);

    let output = cli()
        .args(["simulate", "--json", "--seed", "1", "--route"])
        .arg(&route)
        .arg("--config")
        .arg(&config)
        .timeout(std::time::Duration::from_secs(30))
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["report"]["phase"], "Complete");
    assert_eq!(value["report"]["expected"], 1);
    assert_eq!(value["report"]["matches"][0]["obstacle_id"], 1);
    assert_eq!(value["report"]["matches"][0]["label"], "11");
    assert_eq!(value["metrics"]["commands_sent"], 3);
    let companion: Vec<String> = value["companion"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(companion.contains(&"TARGET,1,11".to_string()));
}

#[test]
fn test_simulate_all_missed() {
    let dir = TempDir::new().unwrap();
    let route = write(&dir, "route.json", ROUTE);
    let config = write(&dir, "mission.toml", FAST_CONFIG);

    cli()
        .args(["simulate", "--miss-rate", "1", "--route"])
        .arg(&route)
        .arg("--config")
        .arg(&config)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Mission Complete: 0/1 obstacles matched"));
}

#[test]
fn test_simulate_rejects_bad_miss_rate() {
    let dir = TempDir::new().unwrap();
    let route = write(&dir, "route.json", ROUTE);

    cli()
        .args(["simulate", "--miss-rate", "2", "--route"])
        .arg(&route)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--miss-rate"));
}
