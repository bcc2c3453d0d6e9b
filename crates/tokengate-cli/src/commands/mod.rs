pub mod keys;
pub mod ledger;
pub mod tokens;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokengate_auth::{
    AuthConfig, Authenticator, InMemoryRevocationLedger, RevocationLedger, SystemClock,
};
use tokengate_auth_postgres::PostgresAuthStorage;

pub fn load_config(path: Option<&Path>) -> Result<AuthConfig> {
    AuthConfig::load(path).context("failed to load configuration")
}

/// Storage for the configured ledger database.
///
/// The pool connects on first use, so connection failures reach the
/// ledger guard and follow its retry and lookup-failure policy.
pub fn connect_storage(config: &AuthConfig) -> Result<PostgresAuthStorage> {
    let url = config
        .ledger
        .database_url
        .as_deref()
        .context("ledger.database_url is not set (or TOKENGATE__LEDGER__DATABASE_URL)")?;
    let storage = PostgresAuthStorage::connect_lazy(url, config.ledger.storage_timeout)
        .context("invalid ledger.database_url")?;
    Ok(storage)
}

/// Authenticator for commands that only sign or validate.
pub fn offline_authenticator(config: &AuthConfig) -> Result<Authenticator> {
    build(config, Arc::new(InMemoryRevocationLedger::new()))
}

/// Authenticator backed by the PostgreSQL ledger.
pub fn ledger_authenticator(config: &AuthConfig) -> Result<Authenticator> {
    let storage = connect_storage(config)?;
    build(config, Arc::new(storage.revocation_ledger()))
}

fn build(config: &AuthConfig, ledger: Arc<dyn RevocationLedger>) -> Result<Authenticator> {
    Authenticator::from_config(config, ledger, Arc::new(SystemClock))
        .context("invalid signing configuration")
}
