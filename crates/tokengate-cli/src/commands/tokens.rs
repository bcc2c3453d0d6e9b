use anyhow::{Context, Result, bail};
use colored::Colorize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use tokengate_auth::{
    AuthConfig, AuthenticatedUser, Clock, Identity, RevokeOutcome, SystemClock, extract_bearer,
};

use crate::cli::{IssueArgs, JtiArgs, TokenArgs};
use crate::output::{print_field, print_json, print_success, print_warning};

use super::{ledger_authenticator, offline_authenticator};

fn bare_token(raw: &str) -> &str {
    extract_bearer(raw).unwrap_or(raw.trim())
}

fn rfc3339(t: time::OffsetDateTime) -> Result<String> {
    t.format(&Rfc3339).context("timestamp out of range")
}

pub fn issue(config: &AuthConfig, args: &IssueArgs) -> Result<()> {
    let auth = offline_authenticator(config)?;
    let identity = Identity::new(&args.user_id, &args.email, &args.roles)
        .with_display_name(args.name.clone().unwrap_or_default());

    let issued = auth.issue(&identity)?;
    print_json(&json!({
        "token": issued.token,
        "jti": issued.jti,
        "expires_at": rfc3339(issued.expires_at)?,
    }));
    Ok(())
}

fn print_identity(identity: &Identity, jti: &str, expires_at: time::OffsetDateTime) -> Result<()> {
    print_field("Subject", identity.user_id());
    print_field("Email", identity.email());
    if !identity.display_name().is_empty() {
        print_field("Name", identity.display_name());
    }
    let roles: Vec<&str> = identity.roles().iter().map(String::as_str).collect();
    print_field("Roles", &roles.join(", "));
    print_field("JTI", jti);
    print_field("Expires", &rfc3339(expires_at)?);
    Ok(())
}

pub fn verify(config: &AuthConfig, args: &TokenArgs) -> Result<()> {
    let auth = offline_authenticator(config)?;
    let validated = match auth.validator().validate(bare_token(&args.token), SystemClock.now()) {
        Ok(v) => v,
        Err(e) => bail!("token rejected: {e}"),
    };

    print_success(&format!("Signature verified with key '{}'", validated.kid));
    print_identity(&validated.identity(), &validated.jti, validated.expires_at)
}

pub async fn authenticate(config: &AuthConfig, args: &TokenArgs) -> Result<()> {
    let auth = ledger_authenticator(config)?;
    let AuthenticatedUser {
        identity,
        jti,
        expires_at,
    } = match auth.authenticate(bare_token(&args.token)).await {
        Ok(user) => user,
        Err(e) => bail!("token rejected: {e}"),
    };

    print_success("Token accepted");
    print_identity(&identity, &jti, expires_at)
}

pub async fn revoke(config: &AuthConfig, args: &JtiArgs) -> Result<()> {
    let auth = ledger_authenticator(config)?;
    let outcome = auth.revoke(&args.jti).await?;
    tracing::info!(jti = %args.jti, newly_revoked = outcome.is_new(), "Revoke command finished");
    match outcome {
        RevokeOutcome::Revoked => print_success(&format!("{} revoked", args.jti)),
        RevokeOutcome::AlreadyRevoked => {
            print_warning(&format!("{} already revoked", args.jti));
        }
    }
    Ok(())
}

/// Advisory revocation lookup; honours `ledger.advisory_lookup_failure`.
pub(crate) async fn advisory_status(config: &AuthConfig, jti: &str) -> Result<bool> {
    let auth = ledger_authenticator(config)?;
    let revoked = auth.ledger().is_revoked_advisory(jti).await?;
    Ok(revoked)
}

pub async fn status(config: &AuthConfig, args: &JtiArgs) -> Result<()> {
    let revoked = advisory_status(config, &args.jti).await?;
    let state = if revoked {
        "revoked".red()
    } else {
        "not revoked".green()
    };
    println!("{}: {}", args.jti, state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;
    use tokengate_auth::{LookupFailureMode, SigningKeyConfig};

    fn unreachable_ledger(mode: LookupFailureMode) -> AuthConfig {
        let mut config = AuthConfig::default();
        config.signing.keys = vec![SigningKeyConfig::hmac_base64(
            "k1",
            "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY",
        )];
        config.ledger.database_url = Some("postgres://nobody@127.0.0.1:1/none".to_string());
        config.ledger.storage_timeout = Duration::from_millis(200);
        config.ledger.max_retry_attempts = 2;
        config.ledger.retry_backoff = Duration::from_millis(5);
        config.ledger.advisory_lookup_failure = mode;
        config
    }

    #[tokio::test]
    async fn status_fails_open_when_ledger_is_unreachable() {
        let config = unreachable_ledger(LookupFailureMode::FailOpen);
        assert!(!advisory_status(&config, "abc").await.unwrap());
    }

    #[tokio::test]
    async fn status_fails_closed_by_default() {
        let config = unreachable_ledger(LookupFailureMode::FailClosed);
        assert!(advisory_status(&config, "abc").await.is_err());
    }

    #[test]
    fn bare_token_strips_bearer_prefix() {
        assert_eq!(bare_token("Bearer a.b.c"), "a.b.c");
        assert_eq!(bare_token(" a.b.c\n"), "a.b.c");
    }
}
