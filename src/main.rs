use std::net::SocketAddr;

use street_royale::{
    config::Config,
    server::{self, AppState},
    AppResult,
};
use tracing::info;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let app_state = AppState::from_config(&config)?;
    if config.snap_url.is_none() {
        info!("SNAP_URL not set, street snapping disabled");
    }
    if config.geolocation_url.is_none() {
        info!("geolocation disabled, everyone spawns from the pool");
    }

    let app = server::router(app_state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
