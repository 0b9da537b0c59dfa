//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use transfer_ledger::domain::CreateAccountParams;
use transfer_ledger::{db, Account, PgStore, Queries};

/// Connect to the test database and make sure the schema exists.
///
/// Tables are not truncated: tests run in parallel against the same
/// database, so each one works on accounts it creates itself.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    db::verify_connection(&pool)
        .await
        .expect("Failed to verify connection");

    db::apply_schema(&pool).await.expect("Failed to apply schema");
    assert!(db::check_schema(&pool).await.unwrap());

    pool
}

/// Create a USD account with the given opening balance
pub async fn create_account(store: &PgStore, owner: &str, balance: i64) -> Account {
    store
        .clone()
        .create_account(CreateAccountParams {
            owner: owner.to_string(),
            balance,
            currency: "USD".to_string(),
        })
        .await
        .expect("Failed to create account")
}
