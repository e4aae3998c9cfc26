use std::sync::Arc;

use socialshelf::{
    build_router,
    config::Config,
    store::{MemoryStore, PgStore, Store},
    AppState,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("socialshelf=info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!("Migrations applied");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL is not set, data will only live in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let addr = config.bind_addr;
    let router = build_router(AppState::new(store, config));

    info!("Listening on {addr}");
    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}
