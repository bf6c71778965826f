//! Blocking HTTP plumbing shared by the LLM and GitHub clients.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, Response};

/// Maximum length of an error body quoted in an error message.
const MAX_ERROR_BODY_LEN: usize = 300;

pub const USER_AGENT: &str = concat!("agent/", env!("CARGO_PKG_VERSION"));

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("build http client")
}

/// Pass a successful response through; turn anything else into an error that
/// quotes a truncated body.
pub fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(anyhow!("{what} failed ({status}): {}", truncate_error_body(&body)))
}

/// Shorten an error body for display, never splitting a character.
pub fn truncate_error_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let prefix: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{prefix}... (truncated)")
}
