use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::config::AppConfig;
use weft_core::event::EventBus;
use weft_core::graph::Graph;
use weft_core::traits::ImageGenerator;
use weft_core::types::{LogEntry, LogLevel, RunEvent, RunId, RunOutcome};

use weft_engine::{
    Collaborators, ExecutorRegistry, InputBroker, ReqwestTransport, RhaiEvaluator, RunJournal,
    Scheduler,
};
use weft_llm::{OpenAiImageClient, ProviderRegistry};

#[derive(Parser)]
#[command(name = "weft", version, about = "Run node-graph workflows from the terminal")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "weft.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow graph
    Run {
        /// Graph JSON as saved by the editor
        graph: PathBuf,
        /// Override the step ceiling
        #[arg(long)]
        max_steps: Option<usize>,
        /// Only print the final output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Check a graph for structural problems
    Validate {
        graph: PathBuf,
    },
    /// Show the effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "weft", &mut io::stdout());
        }
        Commands::Validate { graph } => {
            let graph = Graph::load(&graph)?;
            let issues = graph.validate();
            if issues.is_empty() {
                println!(
                    "ok: {} nodes, {} edges, {} triggers",
                    graph.nodes.len(),
                    graph.edges.len(),
                    graph.triggers().count()
                );
            } else {
                for issue in &issues {
                    println!("- {}", issue);
                }
                anyhow::bail!("{} issue(s) found", issues.len());
            }
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&masked(config))?);
        }
        Commands::Run {
            graph,
            max_steps,
            quiet,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(max_steps) = max_steps {
                anyhow::ensure!(max_steps > 0, "--max-steps must be at least 1");
                config.engine.max_steps = max_steps;
            }
            let graph = Graph::load(&graph)?;
            for issue in graph.validate() {
                warn!(%issue, "Graph issue");
            }
            let outcome = run_graph(config, graph, quiet).await?;
            if outcome == RunOutcome::StepLimitExceeded {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

/// Load the config file, falling back to defaults when the default path is absent.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if !path.exists() && path == Path::new("weft.toml") {
        info!("No weft.toml found, using defaults");
        return Ok(AppConfig::default());
    }
    Ok(AppConfig::load(path)?)
}

async fn run_graph(config: AppConfig, graph: Graph, quiet: bool) -> anyhow::Result<RunOutcome> {
    let event_bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let broker = Arc::new(InputBroker::new(event_bus.clone()));

    let collaborators = Collaborators {
        models: Arc::new(ProviderRegistry::from_config(&config)),
        evaluator: Arc::new(RhaiEvaluator::new(config.engine.script.clone())),
        http: Arc::new(ReqwestTransport::new(&config.http)?),
        human: broker.clone(),
        images: config
            .image
            .clone()
            .map(|image| Arc::new(OpenAiImageClient::new(image)) as Arc<dyn ImageGenerator>),
    };
    let registry = ExecutorRegistry::with_builtins(collaborators, &config.engine);
    let scheduler = Scheduler::new(registry, config.engine.clone(), event_bus.clone());

    let cancel = CancellationToken::new();
    let run_id = RunId::new();

    // Cooperative stop on Ctrl-C
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            eprintln!("\n[stopping after the current node]");
            cancel.cancel();
        });
    }

    let journal = config.log.as_ref().map(|log| {
        RunJournal::new(log.resolved_dir()).spawn(&event_bus, run_id.clone(), cancel.child_token())
    });

    let printer = spawn_printer(&event_bus, broker, run_id.clone(), quiet);

    let result = scheduler.run_with_id(&graph, run_id, cancel).await;
    printer.await.ok();

    if let Some(handle) = journal {
        if let Ok(Some(path)) = handle.await {
            info!(path = %path.display(), "Run journal written");
        }
    }

    if !quiet {
        eprintln!(
            "\n[{:?}: {} steps in {} ms]",
            result.outcome, result.steps, result.elapsed_ms
        );
    }
    if let Some(output) = &result.final_output {
        match output {
            serde_json::Value::String(s) => println!("{}", s),
            other => println!("{}", serde_json::to_string_pretty(other)?),
        }
    }

    Ok(result.outcome)
}

/// Print run events and answer input requests on the terminal.
fn spawn_printer(
    event_bus: &Arc<EventBus>,
    broker: Arc<InputBroker>,
    run_id: RunId,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        let mut streaming = false;
        while let Some(event) = next_event(&mut rx).await {
            match event {
                RunEvent::Log { entry, .. } if !quiet => {
                    if streaming {
                        println!();
                        streaming = false;
                    }
                    println!("{}", format_entry(&entry));
                }
                RunEvent::AgentDelta { text, .. } if !quiet => {
                    print!("{}", text);
                    io::stdout().flush().ok();
                    streaming = true;
                }
                RunEvent::InputRequested { request } => {
                    let broker = broker.clone();
                    let prompt = request.prompt.clone();
                    let answer = tokio::task::spawn_blocking(move || {
                        dialoguer::Input::<String>::new()
                            .with_prompt(prompt)
                            .allow_empty(true)
                            .interact_text()
                            .ok()
                    })
                    .await
                    .ok()
                    .flatten();
                    broker.respond(&request.id, answer).await;
                }
                RunEvent::RunFinished { run_id: finished, .. } if finished == run_id => break,
                _ => {}
            }
        }
    })
}

/// Next event from the bus, skipping past anything a slow reader missed.
/// `None` once the bus is closed.
async fn next_event(rx: &mut broadcast::Receiver<RunEvent>) -> Option<RunEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "Printer fell behind, events dropped"),
            Err(RecvError::Closed) => return None,
        }
    }
}

fn format_entry(entry: &LogEntry) -> String {
    let tag = match entry.level {
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "ERROR",
        LogLevel::Success => " ok ",
    };
    match &entry.node_label {
        Some(label) => format!("[{}] {}: {}", tag, label, entry.message),
        None => format!("[{}] {}", tag, entry.message),
    }
}

/// Replace api keys before printing.
fn masked(mut config: AppConfig) -> AppConfig {
    fn mask(key: &mut Option<String>) {
        if key.is_some() {
            *key = Some("********".to_string());
        }
    }
    if let Some(model) = config.model.as_mut() {
        mask(&mut model.api_key);
    }
    for provider in config.providers.values_mut() {
        mask(&mut provider.api_key);
    }
    if let Some(image) = config.image.as_mut() {
        mask(&mut image.api_key);
    }
    config
}
