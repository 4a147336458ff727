use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use phrasemark_agent::{DocumentSpec, SourceAgent};
use phrasemark_coordinator::{Coordinator, CoordinatorConfig, LocalHost};
use phrasemark_core::{CoordinatorRequest, FileStateStore, SessionState, StateStore};
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "phrasemark",
    version,
    about = "Locate and highlight phrases in document snapshots"
)]
struct Args {
    /// Config file (defaults to config.toml in the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the persisted session
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Debug-level logging for the phrasemark crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Highlight a phrase directly in a snapshot and report where it landed
    Locate {
        #[arg(short, long)]
        snapshot: PathBuf,
        #[arg(short, long)]
        phrase: String,
    },
    /// Print the title and visible text of a snapshot
    Content {
        #[arg(short, long)]
        snapshot: PathBuf,
    },
    /// Route a highlight request through the coordinator
    Route {
        #[arg(short, long)]
        snapshot: PathBuf,
        #[arg(short, long)]
        phrase: String,
        /// Address of the document; defaults to the snapshot's own url
        #[arg(long)]
        url: Option<String>,
        /// Reload the document before routing so its handle goes stale
        #[arg(long)]
        reload: bool,
        /// Start a new session even if one was persisted
        #[arg(long)]
        new_session: bool,
    },
    /// Print the persisted session state
    State,
    /// Close the session and drop its persisted copy
    Close,
}

#[derive(Debug, Serialize)]
struct LocateReport {
    success: bool,
    element: Option<String>,
    inline: bool,
    pass: Option<String>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "phrasemark", "phrasemark")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs.data_local_dir().join("logs"), args.verbose)?;

    match args.command {
        Command::Locate { snapshot, phrase } => {
            let spec = load_snapshot(&snapshot)?;
            let mut agent = SourceAgent::from_spec(&spec);
            let report = match agent.highlight(&phrase) {
                Ok(outcome) => LocateReport {
                    success: true,
                    element: Some(agent.document().describe(outcome.element)),
                    inline: outcome.inline,
                    pass: Some(format!("{:?}", outcome.pass)),
                    error: None,
                },
                Err(err) => LocateReport {
                    success: false,
                    element: None,
                    inline: false,
                    pass: None,
                    error: Some(err.to_string()),
                },
            };
            print_json(&report)
        }
        Command::Content { snapshot } => {
            let spec = load_snapshot(&snapshot)?;
            print_json(&SourceAgent::from_spec(&spec).page_content())
        }
        Command::Route {
            snapshot,
            phrase,
            url,
            reload,
            new_session,
        } => {
            let spec = load_snapshot(&snapshot)?;
            let url = document_url(url, &spec, &snapshot);
            let page_text = SourceAgent::from_spec(&spec).page_content().text;

            let host = Arc::new(LocalHost::new());
            let handle = host.open(spec, &url, true);
            let coordinator = start_coordinator(&args.config, &args.state_dir, &project_dirs, host.clone())?;

            if new_session || coordinator.get_state().is_none() {
                let ack = coordinator
                    .open_session(SessionState::new(page_text), handle, &url)
                    .await;
                if !ack.success {
                    print_json(&ack)?;
                }
            }
            if reload {
                let reloaded = host
                    .reload(handle)
                    .ok_or_else(|| anyhow!("document {handle} vanished before reload"))?;
                info!(%handle, %reloaded, "document reloaded");
            }

            let response = coordinator
                .handle(CoordinatorRequest::ScrollToPhrase { phrase })
                .await;
            coordinator.flush().await;
            print_json(&response)
        }
        Command::State => {
            let host = Arc::new(LocalHost::new());
            let coordinator = start_coordinator(&args.config, &args.state_dir, &project_dirs, host)?;
            let response = coordinator.handle(CoordinatorRequest::GetSessionState).await;
            print_json(&response)
        }
        Command::Close => {
            let host = Arc::new(LocalHost::new());
            let coordinator = start_coordinator(&args.config, &args.state_dir, &project_dirs, host)?;
            let response = coordinator.handle(CoordinatorRequest::CloseSession).await;
            coordinator.flush().await;
            print_json(&response)
        }
    }
}

fn start_coordinator(
    config: &Option<PathBuf>,
    state_dir: &Option<PathBuf>,
    project_dirs: &ProjectDirs,
    host: Arc<LocalHost>,
) -> Result<Coordinator> {
    let config_path = config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = CoordinatorConfig::load(&config_path)?;
    let state_dir = state_dir
        .clone()
        .unwrap_or_else(|| project_dirs.data_local_dir().join("state"));
    let store: Arc<dyn StateStore> =
        Arc::new(FileStateStore::new(state_dir, config.persist_key.clone())?);
    Ok(Coordinator::start(host, store, config))
}

fn load_snapshot(path: &Path) -> Result<DocumentSpec> {
    DocumentSpec::load(path).with_context(|| format!("failed to load snapshot {:?}", path))
}

/// Explicit flag first, then the url recorded in the snapshot, then the
/// snapshot path itself.
fn document_url(flag: Option<String>, spec: &DocumentSpec, snapshot: &Path) -> String {
    flag.or_else(|| spec.url.clone())
        .unwrap_or_else(|| format!("file://{}", snapshot.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

/// Filter used when `RUST_LOG` is unset.
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "info,phrasemark=debug,phrasemark_core=debug,phrasemark_agent=debug,phrasemark_coordinator=debug"
    } else {
        "warn,phrasemark=info,phrasemark_coordinator=info"
    }
}

/// Events go to a daily `phrasemark.log` under `log_dir` and to stderr;
/// stdout is reserved for the JSON results.
fn init_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "phrasemark.log"));

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbose)))?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_writer);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {err}"))?;
    Ok(guard)
}
