use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use wareflow_api::{app_router, config, db, events, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    info!(
        environment = %cfg.environment,
        grouping = %cfg.exchange_grouping,
        "starting wareflow-api"
    );

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    let (event_sender, event_rx) = events::channel(1024);
    tokio::spawn(events::process_events(event_rx));

    let state = AppState::new(Arc::new(pool), cfg.clone(), Some(Arc::new(event_sender)));
    let app = app_router(state);

    let addr = cfg.server_addr();
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}
