use std::sync::Arc;

use schooldesk::api;
use schooldesk::config::{AppConfig, AuthConfig};
use schooldesk::notify::{spawn_dispatcher, LogNotifier};
use schooldesk::shared::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schooldesk=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::load()?;
    if config.auth.token_secret == AuthConfig::default().token_secret {
        tracing::warn!("auth.token_secret is the development default; set DESK_AUTH__TOKEN_SECRET");
    }

    let state = Arc::new(AppState::new(config.clone()));
    let _dispatcher = spawn_dispatcher(state.engine.subscribe(), Arc::new(LogNotifier));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "schooldesk listening");
    axum::serve(listener, api::build_router(state)).await?;
    Ok(())
}
