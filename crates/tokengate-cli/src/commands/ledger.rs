use anyhow::{Context, Result};
use tokengate_auth::AuthConfig;

use super::{connect_storage, ledger_authenticator};
use crate::output::{print_field, print_success};

pub async fn migrate(config: &AuthConfig) -> Result<()> {
    let storage = connect_storage(config)?;
    storage
        .ensure_schema()
        .await
        .context("failed to create the revocation table")?;
    tracing::info!("Migrate command finished");
    print_success("Revocation ledger schema is up to date");
    Ok(())
}

pub async fn sweep(config: &AuthConfig) -> Result<()> {
    let auth = ledger_authenticator(config)?;
    let sweeper = auth.sweeper(config.ledger.sweep_interval);
    let removed = sweeper.sweep_once().await?;
    tracing::info!(removed, "Sweep command finished");
    print_success("Sweep finished");
    print_field("Removed", &removed.to_string());
    print_field(
        "Retention",
        &format!("{}s", config.revocation_retention().whole_seconds()),
    );
    Ok(())
}
