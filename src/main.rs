//! Cast Chain Back binary entrypoint wiring REST routes, storage and the rotation timer.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use cast_chain_back::{
    config::AppConfig,
    dao::game_store::{GameStore, memory::MemoryGameStore},
    routes,
    services::{
        generator::{PairGenerator, PoolPairGenerator},
        rotation_service::RotationScheduler,
        storage_supervisor,
    },
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let generator = build_generator(&config)?;
    let app_state = AppState::new(config, generator);

    spawn_storage(app_state.clone())?;

    let rotate_on_startup = env_flag("ROTATE_ON_STARTUP");
    let scheduler = RotationScheduler::new(app_state.clone()).spawn(rotate_on_startup);

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    scheduler.abort();
    Ok(())
}

/// Choose the actor-pair generator: the remote service when configured, else the local pool.
fn build_generator(config: &AppConfig) -> anyhow::Result<Arc<dyn PairGenerator>> {
    #[cfg(feature = "http-generator")]
    if let Some(url) = env::var("PAIR_GENERATOR_URL").ok().filter(|url| !url.is_empty()) {
        let generator = cast_chain_back::services::generator::HttpPairGenerator::new(&url)
            .context("configuring pair generator")?;
        info!(%url, "using remote pair generator");
        return Ok(Arc::new(generator));
    }

    info!(actors = config.actor_pool().len(), "using built-in actor pool");
    Ok(Arc::new(PoolPairGenerator::new(
        config.actor_pool().to_vec(),
        config.default_difficulty(),
    )))
}

/// Start the storage supervisor for the backend selected by `STORE_BACKEND`.
fn spawn_storage(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "mongo".into());
    match backend.as_str() {
        "memory" => {
            warn!("using in-memory storage; data is lost on restart");
            let store = MemoryGameStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store: Arc<dyn GameStore> = Arc::new(store.clone());
                async move { Ok(store) }
            }));
            Ok(())
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use cast_chain_back::dao::{
                game_store::mongodb::{MongoConfig, MongoGameStore},
                storage::StorageError,
            };

            let uri =
                env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").ok();
            let policy = state.config().rotation_retry();
            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                    let store = MongoGameStore::connect(config, policy).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
                }
            }));
            Ok(())
        }
        other => anyhow::bail!("unsupported STORE_BACKEND `{other}`"),
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
