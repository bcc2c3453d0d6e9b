use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tokengate")]
#[command(about = "Tokengate CLI: issue, verify and revoke bearer tokens")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file (defaults to ./tokengate.toml)
    #[arg(short, long, global = true, env = "TOKENGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a random HMAC signing secret
    Keygen(KeygenArgs),
    /// Issue a token for an identity
    Issue(IssueArgs),
    /// Validate a token without consulting the revocation ledger
    Verify(TokenArgs),
    /// Validate a token and check the revocation ledger
    Authenticate(TokenArgs),
    /// Revoke a token by its jti
    Revoke(JtiArgs),
    /// Show whether a jti is revoked
    Status(JtiArgs),
    /// Create the revocation ledger table
    Migrate,
    /// Purge revocation entries older than the token lifetime
    Sweep,
}

#[derive(clap::Args)]
pub struct KeygenArgs {
    /// Secret length in bytes (at least 32)
    #[arg(long, default_value_t = 64)]
    pub bytes: usize,
}

#[derive(clap::Args)]
pub struct IssueArgs {
    /// User identifier (sub claim)
    #[arg(long)]
    pub user_id: String,
    /// Email address
    #[arg(long)]
    pub email: String,
    /// Display name
    #[arg(long)]
    pub name: Option<String>,
    /// Role name; repeat for several roles
    #[arg(long = "role")]
    pub roles: Vec<String>,
}

#[derive(clap::Args)]
pub struct TokenArgs {
    /// Serialized token, or an `Authorization: Bearer` value
    pub token: String,
}

#[derive(clap::Args)]
pub struct JtiArgs {
    /// Token identifier
    pub jti: String,
}
