//! Bootstrap the API database: admin account and layer catalogue.
//!
//! Run with:
//! ```
//! DATABASE_URL=postgres://... ADMIN_EMAIL=admin@demo.dev ADMIN_PASSWORD=... \
//!     cargo run -p bootstrap --bin bootstrap
//! ```

use std::process::ExitCode;

use bootstrap::config::BootstrapConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match seed().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Bootstrap failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn seed() -> anyhow::Result<()> {
    let config = BootstrapConfig::from_env()?;
    let report = bootstrap::run(config).await?;

    tracing::info!("Bootstrap completed: {report}");
    Ok(())
}
