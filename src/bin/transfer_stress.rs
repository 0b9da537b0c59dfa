//! Transfer Stress Tool
//!
//! Hammers one pair of accounts with concurrent transfers in both directions
//! and checks that nothing was lost.
//!
//! Run with: cargo run --bin transfer_stress --release -- --transfers 200 --amount 10

use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transfer_ledger::domain::CreateAccountParams;
use transfer_ledger::{db, retry_transient, Config, PgStore, Queries, TransferHandler};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transfer_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn arg_or(args: &[String], flag: &str, default: i64) -> i64 {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let transfers = arg_or(&args, "--transfers", 100).max(1);
    let amount = arg_or(&args, "--amount", 10);

    let config = Config::from_env()?;
    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;
    db::apply_schema(&pool).await?;
    if !db::check_schema(&pool).await? {
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    let mut store = PgStore::new(pool.clone()).with_isolation(config.isolation_level);
    let handler = TransferHandler::new(store.clone()).with_policy(config.transfer_policy());
    let retry = config.retry_policy();

    let opening = transfers * amount;
    let open = |owner: &'static str| {
        let mut store = store.clone();
        async move {
            store
                .create_account(CreateAccountParams {
                    owner: owner.to_string(),
                    balance: opening,
                    currency: "USD".to_string(),
                })
                .await
        }
    };
    let a = open("stress_a").await?;
    let b = open("stress_b").await?;

    tracing::info!(
        "Running {} transfers each way between {} and {} ({} isolation)",
        transfers,
        a.id,
        b.id,
        config.isolation_level
    );

    let start = Instant::now();
    let mut tasks = Vec::new();
    for i in 0..transfers * 2 {
        let handler = handler.clone();
        let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
        tasks.push(tokio::spawn(async move {
            retry_transient(&retry, || handler.transfer_money(from, to, amount)).await
        }));
    }

    let mut succeeded = 0u64;
    let mut failed = 0u64;
    for task in tasks {
        match task.await? {
            Ok(_) => succeeded += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!("Transfer failed [{}]: {}", e.kind(), e);
            }
        }
    }
    let elapsed = start.elapsed();

    let a_after = store.get_account(a.id).await?;
    let b_after = store.get_account(b.id).await?;
    let entry_sum: i64 = store
        .list_entries(a.id)
        .await?
        .into_iter()
        .chain(store.list_entries(b.id).await?)
        .map(|e| e.amount)
        .sum();

    let summary = serde_json::json!({
        "transfers": succeeded,
        "failed": failed,
        "seconds": elapsed.as_secs_f64(),
        "rate_per_sec": succeeded as f64 / elapsed.as_secs_f64(),
        "balance_a": a_after.balance,
        "balance_b": b_after.balance,
        "entry_sum": entry_sum,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if a_after.balance + b_after.balance != 2 * opening || entry_sum != 0 {
        return Err(anyhow::anyhow!("Conservation violated"));
    }

    pool.close().await;
    Ok(())
}
