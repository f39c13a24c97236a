use analfabet::store::{DbConfig, Store};
use anyhow::Result;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let db_path = std::env::var("ANALFABET_DB_PATH").unwrap_or_else(|_| "data/analfabet.db".to_string());
    let store = Store::open(&DbConfig { path: db_path.clone() })?;

    println!("db_path={db_path}");
    for (table, count) in store.table_counts()? {
        println!("{table}: {count}");
    }

    match store.last_heartbeat()? {
        Some(hb) => println!(
            "last_heartbeat: ts={} matches_checked={} matches_updated={} bets_scored={} rate_limited={}",
            hb.ts.to_rfc3339(),
            hb.matches_checked,
            hb.matches_updated,
            hb.bets_scored,
            hb.rate_limited
        ),
        None => println!("last_heartbeat: <none>"),
    }

    Ok(())
}
