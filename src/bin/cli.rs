use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use execution_tracker::prelude::*;
use execution_tracker::tracker::{open_store, HandleStore, StepState};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

const SERVER_URL_ENV: &str = "TRACKER_SERVER_URL";

#[derive(Parser)]
#[command(name = "execution-tracker")]
#[command(about = "Track the progress of workflow executions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a tracker YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server URL (overrides config and TRACKER_SERVER_URL)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Track an execution until it finishes
    Watch {
        execution_id: String,

        /// Transport to use (overrides config)
        #[arg(short, long, value_parser = ["push", "pull"])]
        transport: Option<String>,
    },

    /// Reattach to the persisted execution, if it is still running
    Resume,

    /// Print a one-off progress snapshot
    Status {
        execution_id: String,

        #[arg(short, long)]
        json: bool,
    },

    /// Ask the server whether an execution is really running
    Verify { execution_id: String },

    /// Stop a running execution
    Stop { execution_id: String },
}

#[cfg(feature = "otel")]
fn init_otel_tracing(verbose: bool) -> anyhow::Result<()> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::runtime::Tokio;
    use opentelemetry_sdk::trace::TracerProvider;

    let filter = if verbose {
        "execution_tracker=debug"
    } else {
        "execution_tracker=info"
    };

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .build();

    let tracer = provider.tracer("execution-tracker");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    opentelemetry::global::set_tracer_provider(provider);
    Ok(())
}

#[cfg(not(feature = "otel"))]
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "execution_tracker=debug"
    } else {
        "execution_tracker=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "otel")]
    if let Err(e) = init_otel_tracing(cli.verbose) {
        eprintln!("Failed to initialize tracing: {}", e);
        return ExitCode::from(2);
    }

    #[cfg(not(feature = "otel"))]
    init_tracing(cli.verbose);

    let result = run(cli).await;

    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Tracker failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(cli.config.as_deref(), cli.server)?;

    match cli.command {
        Commands::Watch {
            execution_id,
            transport,
        } => watch(config, execution_id, transport).await,
        Commands::Resume => resume(config).await,
        Commands::Status { execution_id, json } => status(config, &execution_id, json).await,
        Commands::Verify { execution_id } => verify(config, &execution_id).await,
        Commands::Stop { execution_id } => stop(config, &execution_id).await,
    }
}

fn load_config(path: Option<&std::path::Path>, server: Option<String>) -> anyhow::Result<TrackerConfig> {
    let mut config = match path {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };

    if let Some(server) = server.or_else(|| std::env::var(SERVER_URL_ENV).ok()) {
        config.server_url = server;
    }
    Ok(config)
}

async fn watch(
    mut config: TrackerConfig,
    execution_id: String,
    transport: Option<String>,
) -> anyhow::Result<bool> {
    match transport.as_deref() {
        Some("push") => config.transport = TransportKind::Push,
        Some("pull") => config.transport = TransportKind::Pull,
        _ => {}
    }

    let mut tracker = Tracker::connect(config, Arc::new(ConsoleEffects));
    println!("Watching execution {}\n", execution_id);
    tracker.start_from_catalog(execution_id);
    follow(&mut tracker).await
}

async fn resume(config: TrackerConfig) -> anyhow::Result<bool> {
    let mut tracker = Tracker::connect(config, Arc::new(ConsoleEffects));

    match tracker.recover().await {
        RecoveryOutcome::Resume { handle, steps } => {
            println!("Resuming execution {} ({} steps known)\n", handle, steps.len());
            follow(&mut tracker).await
        }
        RecoveryOutcome::NothingPersisted => {
            println!("No execution to resume");
            Ok(true)
        }
        RecoveryOutcome::NoActiveExecution { handle } => {
            println!("Execution {} is no longer active", handle);
            Ok(true)
        }
        RecoveryOutcome::NotLive { handle, reason } => {
            println!(
                "Execution {} is not running: {}",
                handle,
                reason.as_deref().unwrap_or("unknown")
            );
            Ok(true)
        }
        RecoveryOutcome::SignedOut => {
            println!("Not signed in, nothing to resume");
            Ok(true)
        }
        RecoveryOutcome::Failed(e) => Err(e.into()),
    }
}

/// Drive the tracker until it goes idle, printing step changes
async fn follow(tracker: &mut Tracker) -> anyhow::Result<bool> {
    let mut printed: Vec<StepState> = Vec::new();
    let mut outcome = None;

    loop {
        let interrupted = tokio::select! {
            more = tracker.next() => {
                if !more {
                    break;
                }
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            println!("\nInterrupted, stopping tracker");
            tracker.stop();
            return Ok(false);
        }

        let state = tracker.state();
        print_changes(&mut printed, state);
        if let Some(kind) = state.terminal_kind() {
            if outcome.is_none() {
                print_summary(kind, state.detail.as_deref());
            }
            outcome = Some(kind);
        }
    }

    Ok(outcome == Some(TerminalKind::Completed))
}

async fn status(config: TrackerConfig, execution_id: &str, json: bool) -> anyhow::Result<bool> {
    let client = GraphQLClient::new(&config.server_url);
    let payload = client.execution_progress(execution_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(true);
    }

    let steps = execution_tracker::merge(&OrderedStepList::default(), &payload, &config.steps);
    println!("Execution: {}", execution_id);
    println!("Status: {:?}\n", payload.status);
    for step in steps.iter() {
        print_step(step);
    }
    if let Some(reason) = payload.stop_reason() {
        println!("\nReason: {}", reason);
    }
    Ok(true)
}

async fn verify(config: TrackerConfig, execution_id: &str) -> anyhow::Result<bool> {
    let client = GraphQLClient::new(&config.server_url);
    let report = client
        .verify_execution(execution_id, config.verify_timeout)
        .await?;

    if report.active {
        println!("✓ Execution {} is running", execution_id);
    } else {
        println!(
            "✗ Execution {} is not running: {}",
            execution_id,
            report
                .message
                .or(report.reason)
                .unwrap_or_else(|| "no reason given".to_string())
        );
    }
    Ok(report.active)
}

async fn stop(config: TrackerConfig, execution_id: &str) -> anyhow::Result<bool> {
    let client = GraphQLClient::new(&config.server_url);
    let stopped = client.stop_execution(execution_id).await?;

    if stopped {
        println!("✓ Stop requested for {}", execution_id);
        let store = open_store(&config.store);
        if store.load()?.as_ref().map(|h| h.as_str()) == Some(execution_id) {
            store.clear()?;
            tracing::debug!(execution_id, "Cleared persisted execution id");
        }
    } else {
        println!("✗ Execution {} could not be stopped", execution_id);
    }
    Ok(stopped)
}

fn status_icon(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "○",
        StepStatus::Running => "●",
        StepStatus::Completed => "✓",
        StepStatus::Failed => "✗",
    }
}

fn print_step(step: &StepState) {
    let counts = match (step.current_count, step.total_count) {
        (Some(current), Some(total)) => format!(" ({}/{})", current, total),
        _ => String::new(),
    };
    println!(
        "  {} {:<32} {:>3}%{}",
        status_icon(step.status),
        step.label,
        step.progress_percent,
        counts
    );
    if let Some(message) = &step.message {
        println!("      {}", message);
    }
}

fn print_changes(printed: &mut Vec<StepState>, state: &TrackerState) {
    for step in state.steps.iter() {
        let seen = printed.iter_mut().find(|p| p.name == step.name);
        match seen {
            Some(previous) if previous == step => {}
            Some(previous) => {
                print_step(step);
                *previous = step.clone();
            }
            None => {
                print_step(step);
                printed.push(step.clone());
            }
        }
    }
}

fn print_summary(kind: TerminalKind, detail: Option<&str>) {
    println!("\n=== Execution {} ===", kind);
    if let Some(detail) = detail {
        println!("{}", detail);
    }
}

/// Side effects rendered on the terminal
struct ConsoleEffects;

impl SideEffects for ConsoleEffects {
    fn notify(&self, message: &str, severity: Severity) {
        let icon = match severity {
            Severity::Info => "ℹ",
            Severity::Success => "✓",
            Severity::Warning => "⚠",
            Severity::Error => "✗",
        };
        println!("{} {}", icon, message);
    }

    fn invalidate(&self, keys: &[String]) {
        tracing::debug!(keys = ?keys, "Invalidating cached views");
    }

    fn navigate(&self, view: &str, data: Option<&Value>) {
        match data {
            Some(data) => println!("→ {} {}", view, data),
            None => println!("→ {}", view),
        }
    }
}
