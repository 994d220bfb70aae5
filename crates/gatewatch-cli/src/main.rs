use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gatewatch_core::report::{report_from_path, ReportOutcome};
use gatewatch_core::timestamp::{format_minutes, format_timestamp};
use gatewatch_core::{AccessLedger, Config, CsvLedger, Intent, Roster, SessionState};
use std::path::PathBuf;

// `#[zbus::proxy]` generates `AccessProxy` (async) and
// `AccessProxyBlocking`. Only the async variant is used here.
#[zbus::proxy(
    interface = "org.gatewatch.Access1",
    default_service = "org.gatewatch.Access1",
    default_path = "/org/gatewatch/Access1"
)]
trait Access {
    async fn set_intent(&self, intent: &str) -> zbus::Result<String>;
    async fn submit(&self, faces: Vec<Vec<f64>>) -> zbus::Result<String>;
    async fn submit_match(&self, identity: &str, distance: f64) -> zbus::Result<String>;
    async fn state(&self, identity: &str) -> zbus::Result<String>;
    async fn info(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "gatewatch", about = "Gatewatch facility access CLI")]
struct Cli {
    /// Talk to gatewatchd on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the pending operator intent on the daemon
    Intent {
        /// none, entry or exit
        intent: Intent,
    },
    /// Submit one frame's face encodings to the daemon
    Submit {
        /// JSON file holding an array of encodings (array of number arrays)
        probes: PathBuf,
    },
    /// Submit a candidate resolved by an external matcher
    SubmitMatch {
        identity: String,
        distance: f64,
    },
    /// Show daemon status
    Info,
    /// Show whether an identity is currently inside
    Status {
        identity: String,
        /// Ask the daemon instead of reading the ledger file
        #[arg(long)]
        daemon: bool,
    },
    /// List ledger events for an identity
    History { identity: String },
    /// List the roster
    Roster,
    /// Summarize the ledger
    Report {
        /// Emit JSON instead of text tables
        #[arg(long)]
        json: bool,
    },
}

async fn proxy(system: bool) -> Result<AccessProxy<'static>> {
    tracing::debug!(bus = if system { "system" } else { "session" }, "connecting to gatewatchd");
    let connection = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    AccessProxy::new(&connection)
        .await
        .context("gatewatchd is not reachable")
}

fn load_config() -> Result<Config> {
    let config = Config::from_env()?;
    tracing::debug!(
        roster = %config.roster_path.display(),
        ledger = %config.ledger_path.display(),
        "configuration loaded"
    );
    Ok(config)
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_state(identity: &str, state: &SessionState) {
    match state {
        SessionState::Outside => println!("{identity}: outside"),
        SessionState::Inside { since } => {
            println!("{identity}: inside since {}", format_timestamp(since))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Intent { intent } => {
            let previous = proxy(cli.system).await?.set_intent(&intent.to_string()).await?;
            println!("intent set to {intent} (was {previous})");
        }
        Commands::Submit { probes } => {
            let raw = std::fs::read_to_string(&probes)
                .with_context(|| format!("failed to read {}", probes.display()))?;
            let faces: Vec<Vec<f64>> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not an array of encodings", probes.display()))?;
            let outcome = proxy(cli.system).await?.submit(faces).await?;
            print_json(&outcome)?;
        }
        Commands::SubmitMatch { identity, distance } => {
            let outcome = proxy(cli.system)
                .await?
                .submit_match(&identity, distance)
                .await?;
            print_json(&outcome)?;
        }
        Commands::Info => {
            let info = proxy(cli.system).await?.info().await?;
            print_json(&info)?;
        }
        Commands::Status { identity, daemon } => {
            if daemon {
                let raw = proxy(cli.system).await?.state(&identity).await?;
                let state: serde_json::Value = serde_json::from_str(&raw)?;
                println!("{identity}: {}", state["state"].as_str().unwrap_or("unknown"));
            } else {
                let config = load_config()?;
                let state = CsvLedger::new(&config.ledger_path).session_state(&identity)?;
                print_state(&identity, &state);
            }
        }
        Commands::History { identity } => {
            let config = load_config()?;
            let history = CsvLedger::new(&config.ledger_path).query_by_identity(&identity)?;
            let mut any = false;
            for event in history.iter() {
                any = true;
                let when = event
                    .timestamp
                    .as_ref()
                    .map(format_timestamp)
                    .unwrap_or_else(|| "(invalid timestamp)".to_string());
                match event.duration_minutes {
                    Some(minutes) => {
                        println!("{when}  {:<8} {} min", event.action, format_minutes(minutes))
                    }
                    None => println!("{when}  {}", event.action),
                }
            }
            if !any {
                println!("no events for {identity}");
            }
        }
        Commands::Roster => {
            let config = load_config()?;
            if !config.roster_path.exists() {
                bail!("no roster at {}", config.roster_path.display());
            }
            let roster = Roster::load(&config.roster_path)?;
            for entry in roster.entries() {
                let permission = if entry.permission { "SI" } else { "NO" };
                println!("{:<24} {:<16} {permission}", entry.identity, entry.role);
            }
        }
        Commands::Report { json } => {
            let config = load_config()?;
            match report_from_path(&config.ledger_path)? {
                ReportOutcome::NoData { message } => println!("{message}"),
                ReportOutcome::Report(report) if json => {
                    println!("{}", serde_json::to_string_pretty(&report)?)
                }
                ReportOutcome::Report(report) => print!("{}", report.render_text()),
            }
        }
    }

    Ok(())
}
