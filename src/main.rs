mod models;
mod service;
mod config;
mod dtos;
mod error;
mod db;
mod handler;
mod routes;

use std::sync::Arc;

use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use config::{Config, StorageBackend};
use db::{DBClient, MemoryStore};
use dotenv::dotenv;
use routes::create_router;
use service::{
    order_gateway::OrderGateway, referral_ledger::ReferralLedger, user_service::UserService,
    Persistence,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub persistence: Persistence,
    pub ledger: Arc<ReferralLedger>,
    pub user_service: UserService,
    pub order_gateway: OrderGateway,
}

impl AppState {
    pub fn new(config: Config, persistence: Persistence) -> Self {
        let ledger = Arc::new(ReferralLedger::new(
            persistence.clone(),
            config.reward_policy.clone(),
        ));
        let user_service = UserService::new(persistence.clone(), ledger.clone(), config.app_url.clone());
        let order_gateway = OrderGateway::new(ledger.clone());

        AppState {
            env: config,
            persistence,
            ledger,
            user_service,
            order_gateway,
        }
    }
}

async fn connect_persistence(config: &Config) -> Persistence {
    if config.storage_backend == StorageBackend::Memory {
        info!("Using the in-memory store; data is lost on restart");
        return Persistence::Available(Arc::new(MemoryStore::new()));
    }

    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL is not set; running in mock mode");
        return Persistence::Unavailable;
    };

    match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await
    {
        Ok(pool) => {
            info!("✅Connection to the database is successful!");
            Persistence::Available(Arc::new(DBClient::new(pool)))
        }
        Err(err) => {
            warn!("🔥 Failed to connect to the database: {:?}; running in mock mode", err);
            Persistence::Unavailable
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();
    let persistence = connect_persistence(&config).await;

    let mut allowed_origins = vec![HeaderValue::from_static("http://localhost:3000")];
    match config.app_url.parse::<HeaderValue>() {
        Ok(origin) if !allowed_origins.contains(&origin) => allowed_origins.push(origin),
        Ok(_) => {}
        Err(err) => warn!("APP_URL is not a valid origin: {}", err),
    }

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT]);

    let app_state = AppState::new(config.clone(), persistence);
    info!("Referral ledger running in {} mode", app_state.persistence.mode());

    let app = create_router(Arc::new(app_state)).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    info!("🚀 Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
}
