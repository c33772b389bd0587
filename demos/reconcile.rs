//! Example: Converge the apt trust store to a TOML manifest
//!
//! Run with: cargo run --example reconcile -- /etc/apt-keys.toml

use std::process::ExitCode;

use apt_key::{Keyring, Manifest, Outcome, Reconciler};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: reconcile <manifest.toml>");
        return ExitCode::from(2);
    };

    match run(&path).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(path: &str) -> apt_key::Result<bool> {
    let manifest = Manifest::load(path).await?;
    let desired = manifest.desired_entries()?;

    let keyring = Keyring::from_config(&manifest.config);
    let reconciler = Reconciler::from_config(keyring, &manifest.config);
    let report = reconciler.reconcile(&desired).await?;

    for entry in &report.entries {
        for advisory in &entry.advisories {
            println!("warning: {advisory}");
        }
        match &entry.outcome {
            Outcome::Created => println!("{}: created", entry.id),
            Outcome::Deleted => println!("{}: deleted", entry.id),
            Outcome::Unchanged => println!("{}: unchanged", entry.id),
            Outcome::Failed(err) => println!("{}: failed: {err}", entry.id),
        }
    }

    Ok(report.is_success())
}
