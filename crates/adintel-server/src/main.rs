mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use adintel_provider::ProviderClient;
use adintel_sync::SyncSettings;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = adintel_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = adintel_db::PoolConfig::from_app_config(&config);
    let pool = adintel_db::connect_pool(&config.database_url, pool_config).await?;
    adintel_db::run_migrations(&pool).await?;

    let settings = Arc::new(SyncSettings::from_app_config(&config));
    let provider = ProviderClient::from_app_config(&config)?.map(Arc::new);

    let _scheduler = match &provider {
        Some(provider) => Some(
            scheduler::build_scheduler(
                pool.clone(),
                Arc::clone(provider),
                Arc::clone(&settings),
                &config,
            )
            .await?,
        ),
        None => {
            tracing::warn!("APIFY_TOKEN not set; scrape scheduler disabled");
            None
        }
    };

    let auth = AuthState::from_env(matches!(
        config.env,
        adintel_core::Environment::Development
    ))?;
    let state = AppState {
        pool,
        provider,
        settings,
    };
    let app = build_app(state, auth, default_rate_limit_state());

    tracing::info!(bind_addr = %config.bind_addr, "adintel-server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
