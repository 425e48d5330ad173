//! Neuromark HTTP server
//!
//! The minimal HTTP surface over the orchestrator, scheduler, and tool
//! registry: schedule or run a goal, chat directly with the orchestrator,
//! report health, and list registered tools.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::info;

use neuromark::agent::Orchestrator;
use neuromark::autonomous::AutonomousLoop;
use neuromark::config::{Config, StorageBackendType};
use neuromark::events::{EventBus, InMemoryEventBus, PostgresEventBus};
use neuromark::forge::{ForgeSandbox, ToolForge};
use neuromark::lifecycle::ToolLifecycleManager;
use neuromark::llm::LlmClient;
use neuromark::monitor::DeploymentMonitor;
use neuromark::scheduler::{GoalStore, InMemoryGoalStore, PgGoalStore, ScheduleType, Scheduler, ScheduledGoal};
use neuromark::storage::{
    ExecutionStore, InMemoryExecutionStore, InMemoryKvStore, KvStore, PgExecutionStore, PostgresKvStore,
};
use neuromark::thought::ThoughtTree;
use neuromark::tools::builtin::{CalculatorTool, KeyValueMemoryTool, ReadFileTool, WriteFileTool};
use neuromark::tools::ToolRegistry;
use neuromark::{Error, VERSION};

#[derive(Clone)]
struct ServerState {
    orchestrator: Arc<Orchestrator>,
    scheduler: Arc<Scheduler>,
    registry: Arc<ToolRegistry>,
}

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidInput(_) | Error::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            Error::ToolNotFound(_) | Error::NoMatchingTool(_) => StatusCode::NOT_FOUND,
            Error::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    goal: String,
}

#[derive(Deserialize)]
struct GoalRequest {
    /// Caller-chosen id. Required when `schedule` is set, ignored for an
    /// immediate run-now request.
    id: Option<String>,
    goal: String,
    /// `once`, `interval`, `cron`, or `on_demand`. Omit to run immediately.
    schedule: Option<String>,
    schedule_value: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
    })
}

async fn get_tools(State(state): State<ServerState>) -> Json<Vec<neuromark::tools::ToolDefinition>> {
    Json(state.registry.definitions())
}

async fn post_chat(
    State(state): State<ServerState>,
    Json(req): Json<ChatRequest>,
) -> Json<neuromark::agent::GoalResponse> {
    Json(state.orchestrator.process(&req.goal).await)
}

async fn post_goals(
    State(state): State<ServerState>,
    Json(req): Json<GoalRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let schedule = match req.schedule.as_deref() {
        None => None,
        Some("once") => Some(ScheduleType::Once),
        Some("interval") => Some(ScheduleType::Interval),
        Some("cron") => Some(ScheduleType::Cron),
        Some("on_demand") => Some(ScheduleType::OnDemand),
        Some(other) => return Err(AppError(Error::InvalidInput(format!("unknown schedule type: {other}")))),
    };

    let Some(schedule_type) = schedule else {
        let id = immediate_goal_id(&req.goal);
        if state.scheduler.get_goal(&id).await?.is_none() {
            let goal = ScheduledGoal::new(&id, &req.goal).with_schedule(ScheduleType::OnDemand, "");
            state.scheduler.add_goal(goal).await?;
        }
        let run = state.scheduler.run_now(&id, true).await?;
        return Ok(Json(serde_json::to_value(run).map_err(Error::Json)?));
    };

    let id = req
        .id
        .ok_or_else(|| Error::InvalidInput("id is required when scheduling a goal".to_string()))?;
    let mut goal = ScheduledGoal::new(&id, &req.goal).with_tags(req.tags);
    goal = goal.with_schedule(schedule_type, req.schedule_value.unwrap_or_default());
    state.scheduler.add_goal(goal).await?;
    Ok(Json(serde_json::json!({ "id": id, "scheduled": true })))
}

/// A short, stable id for an ad-hoc run-now goal, so retries against the
/// same goal text reuse the same scheduler entry instead of piling up.
fn immediate_goal_id(goal_text: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    goal_text.hash(&mut hasher);
    format!("adhoc-{:x}", hasher.finish())
}

fn build_router(state: ServerState) -> Router {
    let api = Router::new()
        .route("/goals", post(post_goals))
        .route("/chat", post(post_chat))
        .route("/health", get(get_health))
        .route("/tools", get(get_tools));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
}

#[derive(clap::Parser)]
#[command(name = "neuromark-server", about = "Neuromark HTTP server")]
struct Args {
    /// Overrides config.server.bind
    #[arg(long)]
    bind: Option<String>,

    /// Overrides config.server.port
    #[arg(long, short)]
    port: Option<u16>,
}

async fn connect_postgres(config: &Config) -> anyhow::Result<sqlx::PgPool> {
    let pg = config
        .storage
        .postgres
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("storage.backend is postgres but storage.postgres is unset"))?;

    Ok(sqlx::postgres::PgPoolOptions::new()
        .max_connections(pg.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(pg.connect_timeout_secs))
        .connect(&pg.url)
        .await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let args = <Args as clap::Parser>::parse();
    let config = Config::from_env()?;

    let kv: Arc<dyn KvStore>;
    let events: Arc<dyn EventBus>;
    let execution_store: Arc<dyn ExecutionStore>;
    let goal_store: Arc<dyn GoalStore>;

    match config.storage.backend {
        StorageBackendType::Memory => {
            kv = Arc::new(InMemoryKvStore::new());
            events = Arc::new(InMemoryEventBus::default());
            execution_store = Arc::new(InMemoryExecutionStore::new());
            goal_store = Arc::new(InMemoryGoalStore::new());
        }
        StorageBackendType::Postgres => {
            let pool = connect_postgres(&config).await?;
            kv = Arc::new(PostgresKvStore::new(pool.clone()));
            events = Arc::new(PostgresEventBus::new(pool.clone()));
            execution_store = Arc::new(PgExecutionStore::new(pool.clone()));
            goal_store = Arc::new(PgGoalStore::new(pool));
        }
    }

    let thoughts = Arc::new(ThoughtTree::new(kv.clone()));
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(CalculatorTool::new()));
    registry.register(Arc::new(KeyValueMemoryTool::new(kv.clone())));
    registry.register(Arc::new(ReadFileTool::new(config.paths.sandbox_dir.clone())));
    registry.register(Arc::new(WriteFileTool::new(config.paths.sandbox_dir.clone())));

    let llm = Arc::new(LlmClient::new(&config.llm)?);
    let forge = Arc::new(ToolForge::new(llm.clone(), kv.clone()));
    forge.load().await?;
    let sandbox = Arc::new(ForgeSandbox::new(config.paths.sandbox_dir.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        llm.clone(),
        events.clone(),
        thoughts,
        registry.clone(),
        forge.clone(),
        sandbox.clone(),
        execution_store.clone(),
        kv,
        true,
    ));

    let scheduler = Arc::new(Scheduler::new(goal_store, config.scheduler.poll_interval_secs));
    register_executor(&scheduler, orchestrator.clone());
    tokio::spawn(scheduler.clone().run());

    let lifecycle = Arc::new(ToolLifecycleManager::new(registry.clone(), forge.clone(), execution_store.clone()));
    let monitor = Arc::new(DeploymentMonitor::new(
        execution_store.clone(),
        registry.clone(),
        forge.clone(),
        sandbox.clone(),
        events,
    ));
    let autonomous_loop = Arc::new(AutonomousLoop::new(
        execution_store,
        registry.clone(),
        forge,
        sandbox,
        lifecycle,
        monitor,
        llm,
    ));
    tokio::spawn(autonomous_loop.clone().run());

    let state = ServerState {
        orchestrator,
        scheduler,
        registry,
    };
    let app = build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("neuromark-server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn register_executor(scheduler: &Arc<Scheduler>, orchestrator: Arc<Orchestrator>) {
    scheduler.set_executor(Arc::new(move |goal_text: String| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            let response = orchestrator.process(&goal_text).await;
            if response.success {
                Ok(serde_json::json!({
                    "intent": response.intent,
                    "result": response.result,
                    "duration_ms": response.duration_ms,
                }))
            } else {
                Err(Error::Execution(response.error.unwrap_or_else(|| "goal failed".to_string())))
            }
        })
    }));
}

