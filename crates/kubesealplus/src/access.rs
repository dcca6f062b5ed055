//! Cloudflare Access handshake for certificate URLs behind Access
//!
//! The token is opaque to us: `cloudflared` does the login flow and hands
//! back a token that is sent in the `cf-access-token` header.

use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use reqwest::Url;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Header carrying the Access token
pub const ACCESS_TOKEN_HEADER: &str = "cf-access-token";

const ACCESS_LOGIN_DOMAIN: &str = "cloudflareaccess.com";

/// Source of Access tokens for a protected URL
pub trait AccessTokenSource {
    fn token(&self, url: &str) -> Result<String>;
}

/// Tokens from the `cloudflared` CLI
pub struct Cloudflared {
    program: String,
}

impl Default for Cloudflared {
    fn default() -> Self {
        Self {
            program: "cloudflared".to_string(),
        }
    }
}

impl Cloudflared {
    fn fetch_token(&self, url: &str) -> Option<String> {
        let output = Command::new(&self.program)
            .args(["access", "token"])
            .arg(format!("-app={}", url))
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!token.is_empty()).then_some(token)
    }
}

impl AccessTokenSource for Cloudflared {
    fn token(&self, url: &str) -> Result<String> {
        if let Some(token) = self.fetch_token(url) {
            debug!(url, "reusing existing Access token");
            return Ok(token);
        }

        info!(url, "no Access token cached, starting cloudflared login");
        let status = Command::new(&self.program)
            .args(["access", "login", url])
            .status()
            .map_err(|e| {
                Error::Certificate(format!("cannot run {} for Access login: {}", self.program, e))
            })?;
        if !status.success() {
            return Err(Error::Certificate(format!(
                "{} access login for {} exited with {}",
                self.program, url, status
            )));
        }

        self.fetch_token(url).ok_or_else(|| {
            Error::Certificate(format!("no Access token available for {} after login", url))
        })
    }
}

/// Whether a redirect target is a Cloudflare Access login page
pub fn is_access_login(location: &str) -> bool {
    let Some(host) = Url::parse(location)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
    else {
        return false;
    };
    host == ACCESS_LOGIN_DOMAIN || host.ends_with(&format!(".{}", ACCESS_LOGIN_DOMAIN))
}

/// Check whether `url` sits behind Cloudflare Access.
///
/// `client` must not follow redirects.
pub fn probe(client: &Client, url: &str) -> Result<bool> {
    let resp = client
        .get(url)
        .send()
        .map_err(|e| Error::Certificate(format!("cannot reach {}: {}", url, e)))?;

    if !resp.status().is_redirection() {
        return Ok(false);
    }
    let location = resp
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let behind_access = is_access_login(location);
    if !behind_access {
        warn!(url, location, "certificate URL redirects outside Cloudflare Access");
    }
    Ok(behind_access)
}
