//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reqflow_core::capability::Capabilities;
use reqflow_core::orchestrator::Completion;
use reqflow_core::{MediatorConfig, RequirementsMediator};
use reqflow_io::{DirectoryDiscovery, FileDocumentParser, FileExporter, JsonWorkspaceStore};
use reqflow_llm::OllamaAnalyzer;

pub mod analyze;
pub mod attachments;
pub mod export;
pub mod import;
pub mod records;

/// Workspace directory used when `--workspace` is not given.
const DEFAULT_WORKSPACE_DIR: &str = ".reqflow";

/// reqflow - requirements import, quality analysis and export
#[derive(Parser)]
#[command(name = "reqflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace directory holding requirements.json (defaults to ./.reqflow)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Mediator configuration file (defaults to <workspace>/reqflow.toml)
    #[arg(long, global = true, env = "REQFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print every domain event as a JSON line on stderr
    #[arg(long, global = true)]
    pub trace_events: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a requirements document into the workspace
    Import(import::ImportArgs),

    /// List requirements
    List(records::ListArgs),

    /// Show one requirement with its analysis
    Show(records::ShowArgs),

    /// Remove a requirement
    Remove(records::RemoveArgs),

    /// Analyze requirement quality with a local LLM
    Analyze(analyze::AnalyzeArgs),

    /// Export requirements to JSON, Markdown or text
    Export(export::ExportArgs),

    /// Discover attachments of a project
    Attachments(attachments::AttachmentArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let workspace = match self.workspace {
            Some(dir) => dir,
            None => std::env::current_dir()
                .context("cannot determine the current directory")?
                .join(DEFAULT_WORKSPACE_DIR),
        };
        let options = SessionOptions {
            workspace,
            config: self.config,
            trace_events: self.trace_events,
        };

        match self.command {
            Commands::Import(args) => import::execute(args, &options).await,
            Commands::List(args) => records::list(args, &options).await,
            Commands::Show(args) => records::show(args, &options).await,
            Commands::Remove(args) => records::remove(args, &options).await,
            Commands::Analyze(args) => analyze::execute(args, &options).await,
            Commands::Export(args) => export::execute(args, &options).await,
            Commands::Attachments(args) => attachments::execute(args, &options).await,
        }
    }
}

/// Global options every command session needs.
pub struct SessionOptions {
    pub workspace: PathBuf,
    pub config: Option<PathBuf>,
    pub trace_events: bool,
}

/// What a command needs from the environment besides the workspace.
#[derive(Default)]
pub struct SessionSetup {
    /// Generation model overriding `OLLAMA_GEN_MODEL`.
    pub model: Option<String>,
    /// Root directory of attachment projects.
    pub attachments_root: Option<PathBuf>,
}

/// A mediator wired to the file system, with Ctrl-C cancellation and
/// optional event tracing.
pub struct Session {
    pub mediator: RequirementsMediator,
    pub workspace: PathBuf,
    pub cancel: CancellationToken,
    tracer: Option<(CancellationToken, JoinHandle<()>)>,
    ctrl_c: JoinHandle<()>,
}

impl Session {
    pub async fn open(options: &SessionOptions, setup: SessionSetup) -> Result<Self> {
        let config = match &options.config {
            Some(path) => MediatorConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => MediatorConfig::load_from_workspace(&options.workspace)?,
        };
        debug!(?config, workspace = %options.workspace.display(), "Opening session");

        let attachments_root = setup
            .attachments_root
            .unwrap_or_else(|| options.workspace.join("attachments"));
        let capabilities = Capabilities {
            parser: Arc::new(FileDocumentParser::new()),
            exporter: Arc::new(FileExporter::new()),
            analyzer: Arc::new(OllamaAnalyzer::from_env(setup.model)),
            discovery: Arc::new(DirectoryDiscovery::new(attachments_root)),
            store: Arc::new(JsonWorkspaceStore::new()),
        };
        let mediator = RequirementsMediator::new(capabilities, config)?;

        let tracer = options.trace_events.then(|| spawn_event_tracer(&mediator));

        if JsonWorkspaceStore::requirements_path(&options.workspace).exists() {
            let loaded = mediator.load_from_workspace(&options.workspace).await?;
            if let Completion::Failed(reason) = loaded.completion {
                bail!(reason);
            }
            info!(count = loaded.count, "Workspace loaded");
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Cancelling... (results committed so far are kept)".yellow());
                token.cancel();
            }
        });

        Ok(Self {
            mediator,
            workspace: options.workspace.clone(),
            cancel,
            tracer,
            ctrl_c,
        })
    }

    /// Save the workspace if anything changed.
    pub async fn save_if_dirty(&self) -> Result<()> {
        if !self.mediator.is_dirty() {
            return Ok(());
        }
        let saved = self.mediator.save(&self.workspace).await?;
        match saved.completion {
            Completion::Succeeded => {
                debug!(count = saved.count, workspace = %self.workspace.display(), "Workspace saved");
                Ok(())
            }
            other => bail!(other.error().unwrap_or_else(|| "save failed".to_string())),
        }
    }

    /// Stop background tasks, flushing any pending traced events.
    pub async fn close(self) {
        self.ctrl_c.abort();
        if let Some((stop, handle)) = self.tracer {
            stop.cancel();
            let _ = handle.await;
        }
    }
}

fn spawn_event_tracer(mediator: &RequirementsMediator) -> (CancellationToken, JoinHandle<()>) {
    let mut rx = mediator.bus().tap();
    let stop = CancellationToken::new();
    let stopped = stop.clone();

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Ok(event) => print_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        eprintln!("{}", format!("... {skipped} event(s) dropped").dimmed());
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = stopped.cancelled() => {
                    while let Ok(event) = rx.try_recv() {
                        print_event(&event);
                    }
                    break;
                }
            }
        }
    });
    (stop, handle)
}

fn print_event(event: &reqflow_core::DomainEvent) {
    match serde_json::to_string(event) {
        Ok(line) => eprintln!("{}", line.dimmed()),
        Err(e) => eprintln!("{} {}", "unprintable event:".red(), e),
    }
}

/// Resolve a path relative to the current directory for display and I/O.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
