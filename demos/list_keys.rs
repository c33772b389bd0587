//! Example: List all keys in the apt trust store
//!
//! Run with: cargo run --example list_keys

use apt_key::{KeyRecord, Keyring, Reconciler};

#[tokio::main]
async fn main() -> apt_key::Result<()> {
    let reconciler = Reconciler::new(Keyring::new());
    let keys = reconciler.observe().await?;

    println!("Found {} keys in the apt trust store\n", keys.len());

    for key in keys.values() {
        println!("{}", format_key_output(key));
    }

    Ok(())
}

fn format_key_output(key: &KeyRecord) -> String {
    let marker = if key.expired() { "[E]" } else { "[-]" };

    let created = key
        .created
        .map(|d| format!(" created {}", d.date_naive()))
        .unwrap_or_default();

    let expires = key
        .expiry
        .map(|d| format!(" expires {}", d.date_naive()))
        .unwrap_or_default();

    format!(
        "{} {} {}{}\n    {}{}{}",
        marker, key.long(), key.key_type, key.size, key.fingerprint, created, expires
    )
}
