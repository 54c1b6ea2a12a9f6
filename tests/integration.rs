use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docup_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docup");
    path
}

fn write_doc(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("content of {}", rel)).unwrap();
}

fn setup_test_env(extra_config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("documents");
    write_doc(&docs, "ProjA/Ph1/pp_master.pdf");
    write_doc(&docs, "ProjA/Ph1/Zn1/f_tiles.jpg");
    write_doc(&docs, "ProjA/Ph1/Zn1/Bd1/bl_site.pdf");
    write_doc(&docs, "ProjA/Ph1/Zn1/Bd1/units/up_U101.pdf");
    write_doc(&docs, "ProjA/Ph1/design_types/g_Villa_A.png");
    write_doc(&docs, "bl_p_ProjA_Ph2.pdf");
    write_doc(&docs, ".DS_Store");

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[org]
instance_url = "https://example.my.salesforce.com"

[upload]
root = "{}/documents"
{}
"#,
        root.display(),
        extra_config
    );
    let config_path = config_dir.join("docup.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docup(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docup_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("DOCUP_ACCESS_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docup binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_check_classifies_tree() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, stderr, success) = run_docup(&config, &["check"]);
    assert!(success, "check failed: {}", stderr);

    assert!(stdout.contains("ProjA/Phase Ph1/Zone Zn1/Building Bd1/Unit U101"));
    assert!(stdout.contains("ProjA/Phase Ph1/Design Type Villa_A"));
    assert!(stdout.contains("ProjA/Phase Ph2"));
    assert!(stdout.contains("Building Location"));
    assert!(stdout.contains("6 documents classified."));
    assert!(!stdout.contains("DS_Store"));
}

#[test]
fn test_check_root_override() {
    let (tmp, config) = setup_test_env("");
    let other = tmp.path().join("other");
    write_doc(&other, "f_z_P_Ph_Z.jpg");

    let (stdout, stderr, success) =
        run_docup(&config, &["check", "--root", other.to_str().unwrap()]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("1 documents classified."));
    assert!(stdout.contains("ZONE"));
}

#[test]
fn test_check_reports_malformed_name() {
    let (tmp, config) = setup_test_env("");
    write_doc(&tmp.path().join("documents"), "bl_p_ProjA.pdf");

    let (_stdout, stderr, success) = run_docup(&config, &["check"]);
    assert!(!success);
    assert!(stderr.contains("bl_p_ProjA.pdf"), "stderr: {}", stderr);
    assert!(stderr.contains("expected 2"), "stderr: {}", stderr);
}

#[test]
fn test_check_empty_root_fails() {
    let (tmp, config) = setup_test_env("");
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let (_stdout, stderr, success) =
        run_docup(&config, &["check", "--root", empty.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("no documents found"), "stderr: {}", stderr);
}

#[test]
fn test_exclude_globs_from_config() {
    let (tmp, config) = setup_test_env("exclude_globs = [\"**/*.png\"]");
    let _ = tmp;
    let (stdout, stderr, success) = run_docup(&config, &["check"]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("5 documents classified."));
    assert!(!stdout.contains("Villa_A"));
}

#[test]
fn test_invalid_batch_size_rejected() {
    let (_tmp, config) = setup_test_env("batch_size = 40");
    let (_stdout, stderr, success) = run_docup(&config, &["check"]);
    assert!(!success);
    assert!(stderr.contains("batch_size"), "stderr: {}", stderr);
}

#[test]
fn test_upload_dry_run() {
    let (_tmp, config) = setup_test_env("batch_size = 2");
    let (stdout, stderr, success) =
        run_docup(&config, &["upload", "--dry-run", "--progress", "json"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(
        stdout.contains("Uploaded 6 documents"),
        "stdout: {}",
        stdout
    );
    assert!(stdout.contains("created 6 attachment records (dry run)"));
    assert!(stderr.contains(r#""event":"progress""#));
    assert!(stderr.contains(r#""fraction":1.0"#));
}

#[test]
fn test_upload_without_instance_url_fails() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("docup.toml");
    fs::write(&config, "[upload]\nroot = \"./nowhere\"\n").unwrap();

    let output = Command::new(docup_binary())
        .arg("--config")
        .arg(&config)
        .args(["upload", "--token", "abc"])
        .env_remove("SF_INSTANCE_URL")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("instance_url"), "stderr: {}", stderr);
}

#[test]
fn test_completions() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, _stderr, success) = run_docup(&config, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("docup"));
}
