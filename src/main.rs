use axum::Router;
use std::{error::Error, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    routes::{cors_layer, init_routes},
    services::{
        leaderboard_service::LeaderboardService, print_service::PrintGateway, store::Deadline,
    },
};

mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod utils;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::root,
        routes::health_check,
        routes::leaderboard::insert_entry,
        routes::leaderboard::update_entry,
        routes::leaderboard::read_leaderboard,
        routes::print::send_print,
    ),
    components(
        schemas(
            models::leaderboard::InsertRequest,
            models::leaderboard::UpdateRequest,
            models::leaderboard::LeaderboardEntryResponse,
            models::print::PrintRequest,
        ),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

/// Registers the `X-API-Key` header scheme referenced by the protected routes.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let comps = openapi.components.get_or_insert_with(Default::default);

        comps.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let store = db::init_db(
        &config.mongodb_uri,
        &config.database_name,
        Deadline::after(config.store_timeout),
    )
    .await?;

    let leaderboard_service = Arc::new(LeaderboardService::new(
        Arc::new(store),
        config.collection_name.clone(),
        config.store_timeout,
    ));

    let print_gateway = match config.print.clone() {
        Some(print) => Some(Arc::new(PrintGateway::new(print)?)),
        None => None,
    };

    let app = Router::new()
        .merge(init_routes(
            leaderboard_service,
            print_gateway,
            Arc::new(config.api_keys.clone()),
        ))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(config.frontend_origin.clone()))
        .layer(TraceLayer::new_for_http());

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server is starting and will listen on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
