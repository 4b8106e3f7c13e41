use axum::Router;
use axum::extract::State;
use dotenv::dotenv;
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod api;
mod app_env;
mod db;
mod domain;
mod dto;
mod external_connections;
#[cfg(test)]
mod integration_test;
mod logging;
mod persistence;
mod routing_utils;

/// State shared by every request handler.
pub struct SharedData {
    pub ext_cxn: persistence::ExternalConnectivity,
}

pub type AppState = State<Arc<SharedData>>;

#[tokio::main]
async fn main() {
    dotenv().ok();
    logging::setup_logging(logging::init_env_filter());

    let db_url = env::var(app_env::DB_URL)
        .unwrap_or_else(|_| panic!("{} must be set to start the server", app_env::DB_URL));
    let db = db::connect_sqlx(&db_url).await;
    let shared_data = Arc::new(SharedData {
        ext_cxn: persistence::ExternalConnectivity::new(db),
    });

    let router = logging::attach_tracing_http(
        Router::new()
            .nest("/api", api::api_routes())
            .merge(api::docs::docs_routes()),
    )
    .with_state(shared_data);

    let port: u16 = env::var(app_env::SERVER_PORT)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(4000);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("could not bind the server port");

    info!("Server listening on port {port}.");
    axum::serve(listener, router)
        .await
        .expect("server stopped unexpectedly");
}
