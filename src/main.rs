use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use supportserver::api_router::configure_api_routes;
use supportserver::core::config::AppConfig;
use supportserver::core::state::{create_pool, AppState};
use supportserver::notifications::spawn_notification_worker;
use supportserver::store::Stores;
use supportserver::tickets::engine::TicketLifecycle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Arc::new(AppConfig::load()?);
    log::info!(
        "starting support server on {}:{}",
        config.server.host,
        config.server.port
    );

    let pool = create_pool(&config)?;
    let stores = Arc::new(Stores::postgres(pool));
    let dispatcher = spawn_notification_worker(config.clone());
    let engine = TicketLifecycle::new(stores.clone(), dispatcher);

    let state = Arc::new(AppState {
        config: config.clone(),
        stores,
        engine,
    });

    let app = Router::new()
        .merge(configure_api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to install shutdown handler: {err}");
        return;
    }
    log::info!("shutdown signal received");
}
