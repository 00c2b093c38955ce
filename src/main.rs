use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use sessiond::configuration::get_configuration;
use sessiond::startup::{run, spawn_refresh_token_purge};
use sessiond::state::AppState;
use sessiond::store::{CredentialStore, PgCredentialStore, PgRefreshTokenStore, RefreshTokenStore};
use sessiond::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .acquire_timeout(configuration.timeouts.store())
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let credentials: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool.clone()));
    let refresh_tokens: Arc<dyn RefreshTokenStore> = Arc::new(PgRefreshTokenStore::new(pool));

    let state = AppState::build(&configuration, credentials, refresh_tokens.clone()).map_err(|e| {
        tracing::error!("Failed to initialise application state: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Initialisation error")
    })?;

    let _purge = spawn_refresh_token_purge(
        refresh_tokens,
        Duration::from_secs(configuration.housekeeping.purge_interval_seconds),
        configuration.timeouts.store(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, state)?.await
}
