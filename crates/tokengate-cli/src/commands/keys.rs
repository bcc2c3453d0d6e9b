use anyhow::{Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD};
use tokengate_auth::token::{MIN_HMAC_SECRET_LEN, random_secret};

use crate::cli::KeygenArgs;

pub fn keygen(args: &KeygenArgs) -> Result<()> {
    if args.bytes < MIN_HMAC_SECRET_LEN {
        bail!(
            "--bytes must be at least {MIN_HMAC_SECRET_LEN} (got {})",
            args.bytes
        );
    }

    let secret = STANDARD.encode(random_secret(args.bytes));
    println!("{secret}");
    eprintln!("\n{} random bytes. Add to tokengate.toml:\n", args.bytes);
    eprintln!("[[signing.keys]]");
    eprintln!("kid = \"<key id>\"");
    eprintln!("secret = \"{secret}\"");
    eprintln!("secret_encoding = \"base64\"");
    Ok(())
}
