use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use placement_portal::config::AppConfig;
use placement_portal::error::AppError;
use placement_portal::telemetry;
use placement_portal::workflows::postings::{
    company_directory, posting_router, ActorIdentity, CompanyProfile, ExpirySweeper,
    MemoryPostingStore, MemoryProfileStore, NewPosting, PostingQuery, ProjectionService,
    RecruiterProfile, ReferenceResolver, SegmentSet, TargetSelection, TracingDispatcher,
    TransitionEngine,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Placement Portal",
    about = "Run the job-placement posting engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a posting through its lifecycle against an in-memory store
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo => run_demo().await,
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let store = Arc::new(MemoryPostingStore::new());
    let profiles = Arc::new(MemoryProfileStore::new());
    let dispatcher = Arc::new(TracingDispatcher);
    let engine = Arc::new(TransitionEngine::new(store.clone(), dispatcher));
    let resolver = Arc::new(ReferenceResolver::new(
        profiles,
        config.engine.resolver_concurrency,
    ));
    let projections = Arc::new(
        ProjectionService::new(store.clone(), resolver)
            .project(PostingQuery::all())
            .await?,
    );

    let shutdown = CancellationToken::new();
    let sweeper = Arc::new(ExpirySweeper::new(engine.clone()));
    let sweep_interval = config.engine.sweep_interval();
    let sweep_cancel = shutdown.clone();
    let sweep_task = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.run(sweep_interval, sweep_cancel).await })
    };

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(posting_router(engine, projections))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "placement posting engine ready");

    axum::serve(listener, app).await?;

    shutdown.cancel();
    let _ = sweep_task.await;
    Ok(())
}

/// Offline walkthrough: seed references, drive two postings through the state
/// machine, run a sweep, and print the resulting projection.
async fn run_demo() -> Result<(), AppError> {
    let store = Arc::new(MemoryPostingStore::new());
    let profiles = Arc::new(MemoryProfileStore::new());
    profiles.put_recruiter(RecruiterProfile {
        id: placement_portal::workflows::postings::ActorId("rec-acme".to_string()),
        name: "Acme Campus Hiring".to_string(),
        email: Some("talent@acme.example".to_string()),
    });
    profiles.put_company(CompanyProfile {
        id: "acme".to_string(),
        name: "Acme Corp".to_string(),
        website: Some("https://acme.example".to_string()),
    });

    let dispatcher = Arc::new(TracingDispatcher);
    let engine = Arc::new(TransitionEngine::new(store.clone(), dispatcher));
    let recruiter = ActorIdentity::recruiter("rec-acme");
    let moderator = ActorIdentity::moderator("mod-ops");

    let expiring = engine
        .create_draft(
            &recruiter,
            NewPosting {
                title: "Backend Engineer".to_string(),
                company_id: Some("acme".to_string()),
                application_deadline: Some(Utc::now() - ChronoDuration::days(1)),
                ..NewPosting::default()
            },
        )
        .await?;
    let open = engine
        .create_draft(
            &recruiter,
            NewPosting {
                title: "Data Analyst".to_string(),
                company_id: Some("acme".to_string()),
                application_deadline: Some(Utc::now() + ChronoDuration::days(14)),
                ..NewPosting::default()
            },
        )
        .await?;

    let selection = TargetSelection::new(
        SegmentSet::All,
        SegmentSet::codes(["23-27"]),
        SegmentSet::codes(["BANGALORE"]),
    );
    engine
        .approve(&moderator, &expiring.id, selection.clone())
        .await?;
    engine.approve(&moderator, &open.id, selection).await?;

    let sweeper = ExpirySweeper::new(engine.clone());
    let report = sweeper.sweep(Utc::now()).await?;

    let resolver = Arc::new(ReferenceResolver::new(profiles, 4));
    let projections = ProjectionService::new(store, resolver)
        .project(PostingQuery::all())
        .await?;
    // Give the projection loop one turn to enrich the seeded data.
    let mut rx = projections.subscribe();
    while rx.borrow().postings.len() < 2 {
        if rx.changed().await.is_err() {
            break;
        }
    }
    let snapshot = projections.latest();
    let directory = company_directory(&snapshot);

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "sweep": report,
            "counters": snapshot.counters,
            "directory": directory,
        }))
        .unwrap_or_else(|_| "{}".to_string())
    );

    projections.shutdown().await;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
