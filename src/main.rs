//! Assistant hub web server
//!
//! (c) Softlandia 2025

use assistant_hub::api;
use assistant_hub::core::services::{MyAccountService, MyAssistantService, MyChatService};
use assistant_hub::infrastructure::database::DatabaseConnection;
use assistant_hub::infrastructure::openai::OpenAiAssistantProvider;
use assistant_hub::infrastructure::repositories::{
    DbAssistantRepository, DbChatRepository, DbUserRepository,
};
use assistant_hub::infrastructure::settings::Settings;
use assistant_hub::infrastructure::storage::MediaStorage;

use anyhow::anyhow;
use axum::http::{HeaderValue, Method};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use log::{info, warn};
use tokio::runtime::{Builder, Runtime};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(web_server_task())
}

async fn web_server_task() -> anyhow::Result<()> {
    let provider = ServiceCollection::new()
        .add(Settings::singleton())
        .add(DatabaseConnection::singleton())
        .add(MediaStorage::singleton())
        .add(OpenAiAssistantProvider::singleton())
        .add(DbAssistantRepository::scoped())
        .add(DbChatRepository::scoped())
        .add(DbUserRepository::scoped())
        .add(MyAssistantService::scoped())
        .add(MyChatService::scoped())
        .add(MyAccountService::scoped())
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;

    let settings = provider.get_required::<Settings>();
    provider.get_required::<DatabaseConnection>().migrate().await?;
    info!("database migrations applied");

    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_origin(origins),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
