//! Connection setup for the PostgreSQL pool and the MongoDB client

use mongodb::options::ClientOptions;
use mongodb::Client;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// Connect a MongoDB client and return it together with the database named in
/// the connection string, if any.
pub async fn connect_mongo(uri: &str) -> Result<(Client, Option<String>), mongodb::error::Error> {
    let options = ClientOptions::parse(uri).await?;
    let database = options.default_database.clone();
    let client = Client::with_options(options)?;
    Ok((client, database))
}
