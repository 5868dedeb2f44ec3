// Acceptance tests for the scriptorium binary
//
// Each test serves its own temporary source tree and points HOME at it, so
// neither a developer's global config nor other tests leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to set up a test workspace
struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn create_file(&self, path: &str, content: &str) {
        let file_path = self.path().join(path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }

        fs::write(file_path, content).unwrap();
    }

    fn scriptorium(&self) -> Command {
        let mut cmd = Command::new(std::env!("CARGO_BIN_EXE_scriptorium"));
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env_remove("SCRIPTORIUM_CONFIG")
            .env_remove("SCRIPTORIUM_ROOT")
            .env_remove("SCRIPTORIUM_MIN_VALIDITY_INTERVAL")
            .env_remove("SCRIPTORIUM_DEFROST_CONCURRENCY")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_list_honours_excludes() {
    let ws = TestWorkspace::new();
    ws.create_file(
        "scriptorium.toml",
        "[source]\nroot = \"docs\"\nexclude = [\"**/*.bak\"]\n",
    );
    ws.create_file("docs/page.tmpl", "hello\n");
    ws.create_file("docs/parts/header.txt", "header\n");
    ws.create_file("docs/old.bak", "ignored\n");

    ws.scriptorium()
        .arg("list")
        .assert()
        .success()
        .stdout("page.tmpl\nparts/header.txt\n");
}

#[test]
fn test_list_json() {
    let ws = TestWorkspace::new();
    ws.create_file("a.tmpl", "a\n");

    let output = ws.scriptorium().args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let names: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(names, vec!["a.tmpl"]);
}

#[test]
fn test_render_expands_includes() {
    let ws = TestWorkspace::new();
    ws.create_file("page.tmpl", "#include \"parts/header.txt\"\nbody\n");
    ws.create_file("parts/header.txt", "#-- shared header\n<h1>\n");

    ws.scriptorium()
        .args(["render", "page.tmpl"])
        .assert()
        .success()
        .stdout("<h1>\nbody\n");
}

#[test]
fn test_render_reports_include_loop() {
    let ws = TestWorkspace::new();
    ws.create_file("a.tmpl", "#include b.tmpl\n");
    ws.create_file("b.tmpl", "#include a.tmpl\n");

    ws.scriptorium()
        .args(["render", "a.tmpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Dependency loop detected: a.tmpl -> b.tmpl -> a.tmpl",
        ))
        .stderr(predicate::str::contains("at b.tmpl:1:1"));
}

#[test]
fn test_render_missing_document() {
    let ws = TestWorkspace::new();

    ws.scriptorium()
        .args(["render", "nowhere.tmpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Document not found: nowhere.tmpl"));
}

#[test]
fn test_root_override_from_env() {
    let ws = TestWorkspace::new();
    ws.create_file("site/index.tmpl", "index\n");

    ws.scriptorium()
        .env("SCRIPTORIUM_ROOT", "site")
        .args(["render", "index.tmpl"])
        .assert()
        .success()
        .stdout("index\n");
}

#[test]
fn test_defrost_success() {
    let ws = TestWorkspace::new();
    ws.create_file("a.tmpl", "a\n");
    ws.create_file("b.tmpl", "#include a.tmpl\n");

    ws.scriptorium()
        .args(["defrost", "--concurrency", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Defrosted 2/2 documents"));
}

#[test]
fn test_defrost_json_reports_failures() {
    let ws = TestWorkspace::new();
    for index in 0..5 {
        ws.create_file(&format!("doc-{}.tmpl", index), "fine\n");
    }
    ws.create_file("broken.tmpl", "ok\n#unknown directive\n");

    let output = ws
        .scriptorium()
        .args(["defrost", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["total"], 6);
    assert_eq!(report["succeeded"], 5);
    assert_eq!(report["interrupted"], false);

    let failures = report["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["document"], "broken.tmpl");
    assert_eq!(failures[0]["kind"], "parsing");
    assert_eq!(failures[0]["stack"][0], "broken.tmpl:2:1");
}

#[test]
fn test_defrost_background() {
    let ws = TestWorkspace::new();
    ws.create_file("a.tmpl", "a\n");

    ws.scriptorium()
        .args(["defrost", "--background"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Defrosted 1/1 documents"));
}

#[test]
fn test_config_example_is_valid() {
    let ws = TestWorkspace::new();

    let output = ws.scriptorium().args(["config", "example"]).output().unwrap();
    assert!(output.status.success());
    let example = String::from_utf8(output.stdout).unwrap();
    assert!(example.contains("[build]"));

    ws.create_file("example.toml", &example);
    ws.scriptorium()
        .args(["config", "validate", "example.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_rejects_bad_duration() {
    let ws = TestWorkspace::new();
    ws.create_file("bad.toml", "[cache]\nmin_validity_interval = \"often\"\n");

    ws.scriptorium()
        .args(["config", "validate", "bad.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_validity_interval"));
}
