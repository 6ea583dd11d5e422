use std::sync::Arc;

use anyhow::Context;
use campaign_flow::agents::HttpAgentInvoker;
use campaign_flow::config::FlowConfig;
use campaign_flow::flow::{KeywordIntentClassifier, TurnCoordinator};
use campaign_flow::routes::{AdminRouteState, FlowRouteState, admin_routes, flow_routes};
use campaign_flow::session::SessionStore;
use campaign_flow::store::{LibSqlBackend, SessionPersistence};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = FlowConfig::from_env().context("Invalid configuration")?;

    eprintln!("Campaign Flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent service: {}", config.agent_url);
    eprintln!("   Turn API: http://{}/api/sessions/{{id}}/turns", config.bind_addr);

    // ── Database ─────────────────────────────────────────────────────────
    let store = match config.db_path {
        Some(ref path) => {
            let backend = LibSqlBackend::new_local(path)
                .await
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            let db: Arc<dyn SessionPersistence> = Arc::new(backend);
            eprintln!("   Database: {}", path.display());
            SessionStore::with_persistence(db)
        }
        None => {
            tracing::warn!("CAMPAIGN_FLOW_DB_PATH not set; sessions are memory-only");
            SessionStore::new()
        }
    };
    let store = Arc::new(store);

    // ── Agents ───────────────────────────────────────────────────────────
    let invoker = Arc::new(HttpAgentInvoker::new(
        config.agent_url.clone(),
        config.agent_api_key.clone(),
        config.agent_timeout,
        config.history_window,
    )
    .context("Failed to build agent client")?);
    let coordinator = Arc::new(TurnCoordinator::new(
        Arc::clone(&store),
        invoker,
        Arc::new(KeywordIntentClassifier::default_rules()),
    ));

    // ── HTTP ─────────────────────────────────────────────────────────────
    let mut app = flow_routes(FlowRouteState { coordinator });
    if config.admin_routes {
        eprintln!("   Admin API: http://{}/admin/sessions/reset", config.bind_addr);
        app = app.merge(admin_routes(AdminRouteState {
            store: Arc::clone(&store),
        }));
    }
    let app = app.layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Campaign flow server started");
    axum::serve(listener, app).await?;

    Ok(())
}
