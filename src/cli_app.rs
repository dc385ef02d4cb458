//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use app_netpolicy::apps::record::AppRecord;
use app_netpolicy::apps::source::{AppSource, ManifestAppSource, build_working_set};
use app_netpolicy::core::config::Config;
use app_netpolicy::core::errors::NetPolicyError;
use app_netpolicy::diff::{EditOp, diff};
use app_netpolicy::engine::{AppRow, OfflineApps, PolicySession, ToggleOutcome};
use app_netpolicy::logger::ActivityLog;
use app_netpolicy::policy::flags::RestrictionFlag;
use app_netpolicy::policy::store::FilePolicyStore;

/// Per-app network policy manager.
#[derive(Debug, Parser)]
#[command(
    name = "netpol",
    author,
    version,
    about = "Per-app network access policy manager",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List apps with their policy mode.
    Apps,
    /// Show every switch for one app.
    Show(ShowArgs),
    /// Allow or block one network condition for an app.
    Set(SetArgs),
    /// Compare two app manifests as an edit script.
    Diff(DiffArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct ShowArgs {
    /// Package name, e.g. org.example.maps.
    package: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Decision {
    Allow,
    Block,
}

#[derive(Debug, Clone, Args)]
struct SetArgs {
    /// Package name.
    package: String,
    /// Condition: all, background, wifi, cellular or vpn.
    #[arg(value_parser = parse_flag)]
    flag: RestrictionFlag,
    /// Allow or block traffic under the condition.
    #[arg(value_enum)]
    decision: Decision,
}

#[derive(Debug, Clone, Args)]
struct DiffArgs {
    /// Manifest describing the earlier snapshot.
    old: PathBuf,
    /// Manifest describing the later snapshot.
    new: PathBuf,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<NetPolicyError> for CliError {
    fn from(err: NetPolicyError) -> Self {
        match err {
            NetPolicyError::InvalidConfig { .. }
            | NetPolicyError::MissingConfig { .. }
            | NetPolicyError::ConfigParse { .. }
            | NetPolicyError::ManifestParse { .. }
            | NetPolicyError::DuplicatePackage { .. }
            | NetPolicyError::UnknownFlag { .. }
            | NetPolicyError::UntrackedFlag { .. } => Self::User(err.to_string()),
            NetPolicyError::PolicyStore { .. }
            | NetPolicyError::Enumeration { .. }
            | NetPolicyError::Io { .. }
            | NetPolicyError::Runtime { .. } => Self::Runtime(err.to_string()),
            NetPolicyError::Serialization { .. } => Self::Internal(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Apps => run_apps(cli),
        Command::Show(args) => run_show(cli, args),
        Command::Set(args) => run_set(cli, args),
        Command::Diff(args) => run_diff(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn parse_flag(raw: &str) -> Result<RestrictionFlag, String> {
    raw.parse::<RestrictionFlag>().map_err(|err| err.to_string())
}

// ──────────────────── session commands ────────────────────

fn open_session(cli: &Cli) -> Result<(Config, PolicySession), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let store = Arc::new(FilePolicyStore::new(config.paths.policy_store.clone()));
    let log = ActivityLog::from_config(&config.logging, &config.paths.activity_log);
    let session = PolicySession::new(store, config.engine.capabilities(), log);
    session.reload(&ManifestAppSource::new(config.paths.app_manifest.clone()))?;
    Ok((config, session))
}

fn run_apps(cli: &Cli) -> Result<(), CliError> {
    let (_config, session) = open_session(cli)?;
    let rows = session.render();

    match output_mode(cli) {
        OutputMode::Human => {
            if rows.is_empty() {
                println!("No apps with network access.");
            }
            for row in &rows {
                let uid = row
                    .uid
                    .map_or_else(|| "-".to_string(), |uid| uid.to_string());
                println!(
                    "{:<24} {:<36} {:>7}  {}",
                    row.name,
                    row.package_name,
                    uid,
                    mode_text(row)
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "apps",
                "generation": session.generation(),
                "apps": serde_json::to_value(&rows)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_show(cli: &Cli, args: &ShowArgs) -> Result<(), CliError> {
    let (_config, session) = open_session(cli)?;
    let row = session
        .row(&args.package)
        .ok_or_else(|| CliError::User(format!("unknown package: {}", args.package)))?;

    match output_mode(cli) {
        OutputMode::Human => print_row(&row),
        OutputMode::Json => {
            let payload = json!({
                "command": "show",
                "app": serde_json::to_value(&row)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_set(cli: &Cli, args: &SetArgs) -> Result<(), CliError> {
    let (_config, session) = open_session(cli)?;
    let binding = session
        .bind(0, &args.package)
        .ok_or_else(|| CliError::User(format!("unknown package: {}", args.package)))?;
    let checked = args.decision == Decision::Allow;

    let row = match session.toggle(&binding, args.flag, checked)? {
        ToggleOutcome::Applied(row) => row,
        ToggleOutcome::Discarded(reason) => {
            return Err(CliError::User(format!(
                "{} not changed: {reason}",
                args.package
            )));
        }
    };

    match output_mode(cli) {
        OutputMode::Human => {
            let verb = if checked { "allowed".green() } else { "blocked".red() };
            println!("{} {verb} for {}", args.flag.label(), row.package_name);
            print_row(&row);
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "set",
                "flag": args.flag,
                "allowed": checked,
                "app": serde_json::to_value(&row)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_diff(cli: &Cli, args: &DiffArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let offline = config.engine.capabilities().offline_apps;
    let old = load_working_set(&args.old, offline)?;
    let new = load_working_set(&args.new, offline)?;
    let script = diff(&old, &new);
    let summary = script.summary();

    match output_mode(cli) {
        OutputMode::Human => {
            if script.is_empty() {
                println!("No changes.");
            }
            for op in script.ops() {
                let (label, package) = match op {
                    EditOp::Update { item, .. } => ("update".yellow(), item.package_name.as_str()),
                    EditOp::Rebind { item, .. } => ("rebind".normal(), item.package_name.as_str()),
                    EditOp::Remove { index } => ("remove".red(), package_at(&old, *index)),
                    EditOp::MoveOut { index } => ("move-out".cyan(), package_at(&old, *index)),
                    EditOp::Insert { item, .. } => ("insert".green(), item.package_name.as_str()),
                    EditOp::MoveIn { item, .. } => ("move-in".cyan(), item.package_name.as_str()),
                };
                println!("{label:<9} {:>4}  {package}", op.index());
            }
            println!(
                "{} inserted, {} removed, {} moved, {} updated",
                summary.inserted, summary.removed, summary.moved, summary.updated
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "diff",
                "ops": serde_json::to_value(&script)?,
                "summary": serde_json::to_value(summary)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn load_working_set(manifest: &Path, offline: OfflineApps) -> Result<Vec<AppRecord>, CliError> {
    let set = build_working_set(ManifestAppSource::new(manifest).enumerate()?, offline)?;
    for app in &set.skipped {
        eprintln!(
            "netpol: {}: skipping {:?} with blank package name",
            manifest.display(),
            app.name
        );
    }
    Ok(set.records)
}

fn package_at(records: &[AppRecord], index: usize) -> &str {
    records
        .get(index)
        .map_or("", |record| record.package_name.as_str())
}

fn mode_text(row: &AppRow) -> String {
    match row.mode {
        Some(mode) => mode.label().to_string(),
        None => "No network access".dimmed().to_string(),
    }
}

fn print_row(row: &AppRow) {
    println!("{} ({})", row.name.bold(), row.package_name);
    if let Some(uid) = row.uid {
        println!("  UID: {uid}");
    }
    println!("  Mode: {}", mode_text(row));
    for switch in &row.switches {
        let state = if switch.checked {
            "allowed".green()
        } else {
            "blocked".red()
        };
        let lock = if switch.enabled { "" } else { " (locked)" };
        println!("  {:<16} {state}{lock}", switch.flag.label());
    }
}

// ──────────────────── config command ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                            "code": e.code(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output helpers ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("NETPOL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
