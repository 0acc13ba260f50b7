//! Bearer tokens for the source and target environments

use anyhow::{Context, Result, bail};
use is_terminal::IsTerminal;

pub const SOURCE_TOKEN_VAR: &str = "DYNAMICS_SOURCE_TOKEN";
pub const TARGET_TOKEN_VAR: &str = "DYNAMICS_TARGET_TOKEN";

/// Token from `var`, prompting for it on a terminal when unset
pub fn resolve_token(var: &str, environment: &str) -> Result<String> {
    if let Ok(token) = std::env::var(var) {
        let token = token.trim();
        if !token.is_empty() {
            log::debug!("Using token from {}", var);
            return Ok(token.to_string());
        }
    }

    if !std::io::stdin().is_terminal() {
        bail!(
            "{} is not set and no terminal is available to ask for the token of {}",
            var,
            environment
        );
    }

    let token = rpassword::prompt_password(format!("Bearer token for {}: ", environment))
        .context("Failed to read token")?;
    let token = token.trim();
    if token.is_empty() {
        bail!("No token provided for {}", environment);
    }

    Ok(token.to_string())
}
