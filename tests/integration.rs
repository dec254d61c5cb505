use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cubes_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cubes");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
path = "{root}/data/cubes.json"

[assets]
root = "{root}/public"

[server]
bind = "127.0.0.1:3001"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("cubes.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cubes(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cubes_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cubes binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn write_store(tmp: &TempDir, content: &str) {
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("cubes.json"), content).unwrap();
}

#[test]
fn test_init_creates_store_and_assets() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cubes(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let store = fs::read_to_string(tmp.path().join("data/cubes.json")).unwrap();
    assert_eq!(store.trim(), "[]");
    assert!(tmp.path().join("public/cubes").is_dir());
}

#[test]
fn test_init_idempotent_keeps_records() {
    let (tmp, config_path) = setup_test_env();
    write_store(&tmp, r#"[{"id": "1", "name": "Void Cube"}]"#);

    let (_, _, success) = run_cubes(&config_path, &["init"]);
    assert!(success, "init over an existing store failed");

    let (stdout, _, _) = run_cubes(&config_path, &["list"]);
    assert!(stdout.contains("Void Cube"));
}

#[test]
fn test_list_empty() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_cubes(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("No records"));
}

#[test]
fn test_list_normalizes_legacy_entries() {
    let (tmp, config_path) = setup_test_env();
    write_store(
        &tmp,
        r#"[
  {"id": 3, "name": "Megaminx", "files": {"images": ["main.jpg"]}, "solved": true},
  {"id": "4", "name": "Square-1", "solutionType": "link", "solutionLink": "https://x.test/sq1"}
]"#,
    );

    let (stdout, stderr, success) = run_cubes(&config_path, &["list"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("Megaminx"));
    assert!(stdout.contains("solved"));

    let (stdout, _, success) = run_cubes(&config_path, &["get", "3"]);
    assert!(success);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["id"], "3");
    assert_eq!(record["images"][0], "/cubes/cube-3/images/main.jpg");
    assert!(record.get("files").is_none());

    let (stdout, _, _) = run_cubes(&config_path, &["get", "4"]);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["solutionLinks"][0], "https://x.test/sq1");
}

#[test]
fn test_get_missing_record() {
    let (_tmp, config_path) = setup_test_env();
    run_cubes(&config_path, &["init"]);

    let (_, stderr, success) = run_cubes(&config_path, &["get", "42"]);
    assert!(!success, "get with missing id should fail");
    assert!(
        stderr.contains("not found"),
        "Should report not found, got: {}",
        stderr
    );
}

#[test]
fn test_next_id() {
    let (tmp, config_path) = setup_test_env();
    write_store(
        &tmp,
        r#"[{"id": "2", "name": "a"}, {"id": "custom", "name": "b"}, {"id": "9", "name": "c"}]"#,
    );
    let (stdout, _, success) = run_cubes(&config_path, &["next-id"]);
    assert!(success);
    assert_eq!(stdout.trim(), "10");
}

#[test]
fn test_corrupt_store_fails() {
    let (tmp, config_path) = setup_test_env();
    write_store(&tmp, "{ not json");
    let (_, stderr, success) = run_cubes(&config_path, &["list"]);
    assert!(!success);
    assert!(stderr.contains("corrupt"), "got: {}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("cubes.toml");
    fs::write(
        &config_path,
        "[store]\npath = \"x.json\"\n\n[server]\nbind = \"127.0.0.1:0\"\n\n[uploads]\nmax_file_size_mb = 0\n",
    )
    .unwrap();
    let (_, stderr, success) = run_cubes(&config_path, &["list"]);
    assert!(!success);
    assert!(stderr.contains("max_file_size_mb"), "got: {}", stderr);
}
