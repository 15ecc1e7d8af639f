//! Converso companions server
//!
//! Server-rendered companion pages plus a JSON API over the same actions.

use converso::api;
use converso::config::Config;
use converso::core::services::MyCompanionService;
use converso::infrastructure::database::DatabaseConnection;
use converso::infrastructure::repositories::DbCompanionRepository;
use converso::infrastructure::view_cache::ViewCache;

use anyhow::{Context, anyhow};
use axum::Router;
use axum::http::{HeaderValue, Method};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use log::{info, warn};
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    // fail early on a broken environment; DI re-reads the same values
    let config = Config::from_env().context("invalid configuration")?;
    config.store().context("no companion store configured")?;

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    let web_task_handle = runtime.spawn(web_server_task(config));

    runtime.block_on(async { web_task_handle.await.context("failed to join web task")? })
}

fn cors(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(origins)
}

async fn web_server_task(config: Config) -> anyhow::Result<()> {
    let provider = ServiceCollection::new()
        .add(Config::singleton())
        .add(DatabaseConnection::singleton())
        .add(ViewCache::singleton())
        .add(DbCompanionRepository::scoped())
        .add(MyCompanionService::scoped())
        .build_provider()
        .map_err(|e| anyhow!("failed to build service provider: {e:?}"))?;

    provider
        .get_required::<DatabaseConnection>()
        .migrate()
        .await
        .context("failed to migrate the companion store")?;

    // build our application with its routes
    let app = Router::new()
        .merge(api::pages::router())
        .nest("/api", api::companions::router())
        .nest_service(
            "/static",
            ServiceBuilder::new().service(ServeDir::new("static")),
        )
        .layer(cors(&config))
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    info!("Shutting down...");
    Ok(())
}
