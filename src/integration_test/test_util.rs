use crate::{SharedData, api, app_env, db, persistence};
use axum::Router;
use dotenv::dotenv;
use rand::Rng;
use std::env;
use std::sync::Arc;

/// Builds the full API router against the database at [app_env::test::TEST_DB_URL]. The
/// schema from `schema.sql` must already be applied to that database.
pub async fn test_router() -> Router {
    if dotenv().is_err() {
        println!("Test is running without .env file.");
    }

    let db_url = env::var(app_env::test::TEST_DB_URL)
        .expect("You must provide the TEST_DB_URL environment variable to run integration tests");
    let pool = db::connect_sqlx(&db_url).await;

    Router::new()
        .nest("/api", api::api_routes())
        .with_state(Arc::new(SharedData {
            ext_cxn: persistence::ExternalConnectivity::new(pool),
        }))
}

/// A randomized email so repeated test runs never trip the uniqueness constraint.
pub fn unique_email(tag: &str) -> String {
    let nonce: u32 = rand::thread_rng().gen_range(100_000..999_999);
    format!("{tag}+{nonce}@example.com")
}
