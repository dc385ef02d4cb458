#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_netpol") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "netpol.exe" } else { "netpol" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve netpol binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("netpol-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .env_remove("NETPOL_OUTPUT_FORMAT");
    for (name, value) in env {
        command.env(name, value);
    }
    let output = command.output().expect("execute netpol command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("env={env:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Self-contained config, manifest, policy file and log in a temp dir.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: PathBuf,
    pub manifest: PathBuf,
    pub policy: PathBuf,
    pub log: PathBuf,
}

impl Fixture {
    pub fn new(manifest: &str) -> Self {
        Self::with_engine(manifest, "")
    }

    /// `engine` is extra TOML placed in the `[engine]` table.
    pub fn with_engine(manifest: &str, engine: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("config.toml");
        let manifest_path = dir.path().join("apps.toml");
        let policy = dir.path().join("policy.json");
        let log = dir.path().join("activity.jsonl");
        fs::write(&manifest_path, manifest).expect("write manifest");
        fs::write(
            &config,
            format!(
                "[engine]\n{engine}\n\n[paths]\napp_manifest = \"apps.toml\"\npolicy_store = \"policy.json\"\nactivity_log = \"activity.jsonl\"\n\n[logging]\nfsync_interval_secs = 0\n"
            ),
        )
        .expect("write config");
        Self {
            dir,
            config,
            manifest: manifest_path,
            policy,
            log,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run with `--config` pointing at the fixture and JSON output.
    pub fn run(&self, case_name: &str, args: &[&str]) -> CmdResult {
        let config = self.config.to_string_lossy().to_string();
        let mut full = vec!["--config", config.as_str(), "--json"];
        full.extend_from_slice(args);
        let home = self.dir.path().to_string_lossy().to_string();
        run_cli_case_with_env(case_name, &full, &[("HOME", home.as_str())])
    }

    pub fn log_lines(&self) -> Vec<serde_json::Value> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).expect("log line is JSON"))
            .collect()
    }
}

pub fn parse_json(result: &CmdResult) -> serde_json::Value {
    serde_json::from_str(result.stdout.trim()).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}); log: {}",
            result.log_path.display()
        )
    })
}
