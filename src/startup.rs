use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use chrono::Utc;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::json_error_handler;
use crate::logger::RequestLogger;
use crate::routes::{check, health_check, login, logout, method_not_allowed, refresh};
use crate::state::AppState;
use crate::store::{bounded, RefreshTokenStore};

/// Largest login body accepted, in bytes
const MAX_JSON_BODY: usize = 4096;

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .limit(MAX_JSON_BODY)
            .error_handler(json_error_handler);

        App::new()
            .wrap(RequestLogger)
            .app_data(state.clone())
            .app_data(json_config)
            .route("/health_check", web::get().to(health_check))
            .service(
                web::resource("/login")
                    .route(web::post().to(login))
                    .default_service(web::to(method_not_allowed("POST"))),
            )
            .service(
                web::resource("/check")
                    .route(web::get().to(check))
                    .route(web::post().to(check))
                    .default_service(web::to(method_not_allowed("GET, POST"))),
            )
            .service(
                web::resource("/refresh")
                    .route(web::post().to(refresh))
                    .default_service(web::to(method_not_allowed("POST"))),
            )
            .service(
                web::resource("/logout")
                    .route(web::post().to(logout))
                    .default_service(web::to(method_not_allowed("POST"))),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Periodically delete refresh records past their expiry.
///
/// Failures are logged and retried on the next tick.
pub fn spawn_refresh_token_purge(
    store: Arc<dyn RefreshTokenStore>,
    every: Duration,
    store_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match bounded(store_timeout, "refresh record purge", store.purge_expired(Utc::now())).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired refresh tokens"),
                Err(e) => tracing::error!(error = %e, "Failed to purge expired refresh tokens"),
            }
        }
    })
}
