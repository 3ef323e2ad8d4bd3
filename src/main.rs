mod app;
mod auth;
mod config;
mod error;
mod state;

use tracing_subscriber::EnvFilter;

use crate::state::AppState;

/// `RUST_LOG` picks levels; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("authd=debug,axum=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().with_current_span(true).init(),
        _ => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let app_state = AppState::init().await?;
    tracing::info!(
        host = %app_state.config.host,
        port = app_state.config.port,
        issuer = %app_state.config.jwt.issuer,
        "configuration loaded"
    );

    let (host, port) = (app_state.config.host.clone(), app_state.config.port);
    app::serve(app::build_app(app_state), &host, port).await
}
