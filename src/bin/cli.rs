//! Neuromark CLI
//!
//! Command-line entry point for running a single goal, either one-shot or
//! as an interactive session, against a locally constructed orchestrator.

use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Input};
use std::sync::Arc;

use neuromark::agent::Orchestrator;
use neuromark::config::{Config, StorageBackendType};
use neuromark::events::{EventBus, InMemoryEventBus, PostgresEventBus};
use neuromark::forge::{ForgeSandbox, ToolForge};
use neuromark::llm::LlmClient;
use neuromark::storage::{
    ExecutionStore, InMemoryExecutionStore, InMemoryKvStore, KvStore, PgExecutionStore, PostgresKvStore,
};
use neuromark::thought::ThoughtTree;
use neuromark::tools::builtin::{CalculatorTool, KeyValueMemoryTool, ReadFileTool, WriteFileTool};
use neuromark::tools::ToolRegistry;
use neuromark::{Error, Result, VERSION};

#[derive(Parser)]
#[command(
    name = "neuromark",
    author = "Neuromark Contributors",
    version = VERSION,
    about = "Neuromark - a self-improving agentic orchestration engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal through the orchestrator
    Run {
        /// Goal text to run. Omit with --interactive for a prompt loop.
        #[arg(short, long)]
        goal: Option<String>,

        /// Prompt for goals in a loop instead of running one and exiting
        #[arg(short, long)]
        interactive: bool,
    },

    /// List the tools currently registered
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("neuromark=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { goal, interactive }) => run_command(goal, interactive).await,
        Some(Commands::Tools) => list_tools().await,
        None => run_command(None, true).await,
    }
}

async fn run_command(goal: Option<String>, interactive: bool) -> Result<()> {
    let orchestrator = build_orchestrator().await?;

    if let Some(goal_text) = goal {
        print_response(&orchestrator.process(&goal_text).await);
        if interactive {
            interactive_loop(&orchestrator).await?;
        }
        return Ok(());
    }

    if interactive {
        interactive_loop(&orchestrator).await
    } else {
        eprintln!("pass --goal <text> or --interactive");
        Ok(())
    }
}

async fn interactive_loop(orchestrator: &Orchestrator) -> Result<()> {
    let theme = ColorfulTheme::default();
    loop {
        let goal_text: String = Input::with_theme(&theme)
            .with_prompt("goal (blank to quit)")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        if goal_text.trim().is_empty() {
            break;
        }
        print_response(&orchestrator.process(&goal_text).await);
    }
    Ok(())
}

fn print_response(response: &neuromark::agent::GoalResponse) {
    if response.success {
        println!(
            "[{}] {} ({}ms, {} messages)",
            response.intent.as_deref().unwrap_or("unknown"),
            response.result.as_deref().unwrap_or(""),
            response.duration_ms,
            response.message_count
        );
    } else {
        eprintln!(
            "goal {} failed: {}",
            response.goal_id,
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
}

async fn list_tools() -> Result<()> {
    let config = Config::from_env()?;
    let registry = build_registry(build_memory_store(&config).await?);
    for def in registry.definitions() {
        println!("{:<24} {}", def.name, def.description);
    }
    Ok(())
}

async fn build_memory_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    match config.storage.backend {
        StorageBackendType::Memory => Ok(Arc::new(InMemoryKvStore::new())),
        StorageBackendType::Postgres => {
            let pool = connect_postgres(config).await?;
            Ok(Arc::new(PostgresKvStore::new(pool)))
        }
    }
}

async fn connect_postgres(config: &Config) -> Result<sqlx::PgPool> {
    let pg = config
        .storage
        .postgres
        .as_ref()
        .ok_or_else(|| Error::Config("storage.backend is postgres but storage.postgres is unset".to_string()))?;

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(pg.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(pg.connect_timeout_secs))
        .connect(&pg.url)
        .await
        .map_err(Error::Database)
}

fn build_registry(kv: Arc<dyn KvStore>) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(CalculatorTool::new()));
    registry.register(Arc::new(KeyValueMemoryTool::new(kv)));
    registry
}

async fn build_orchestrator() -> Result<Orchestrator> {
    let config = Config::from_env()?;

    let kv = build_memory_store(&config).await?;
    let (events, execution_store): (Arc<dyn EventBus>, Arc<dyn ExecutionStore>) = match config.storage.backend {
        StorageBackendType::Memory => (Arc::new(InMemoryEventBus::default()), Arc::new(InMemoryExecutionStore::new())),
        StorageBackendType::Postgres => {
            let pool = connect_postgres(&config).await?;
            (
                Arc::new(PostgresEventBus::new(pool.clone())),
                Arc::new(PgExecutionStore::new(pool)),
            )
        }
    };

    let thoughts = Arc::new(ThoughtTree::new(kv.clone()));
    let registry = build_registry(kv.clone());
    registry.register(Arc::new(ReadFileTool::new(config.paths.sandbox_dir.clone())));
    registry.register(Arc::new(WriteFileTool::new(config.paths.sandbox_dir.clone())));

    let llm = Arc::new(LlmClient::new(&config.llm)?);
    let forge = Arc::new(ToolForge::new(llm.clone(), kv.clone()));
    let sandbox = Arc::new(ForgeSandbox::new(config.paths.sandbox_dir.clone()));

    Ok(Orchestrator::new(
        llm,
        events,
        thoughts,
        registry,
        forge,
        sandbox,
        execution_store,
        kv,
        true,
    ))
}
