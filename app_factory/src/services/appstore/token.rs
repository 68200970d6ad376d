//! Login-with-Amazon OAuth2 tokens.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Refresh this long before the token actually expires.
pub const REFRESH_MARGIN_SECS: i64 = 60;

pub const APPSTORE_SCOPE: &str = "appstore::apps:readwrite";

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn from_response(resp: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: now + Duration::seconds(resp.expires_in),
        }
    }

    /// True once `now` is within [`REFRESH_MARGIN_SECS`] of expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

/// Form body for the token endpoint: a refresh grant when a refresh token is
/// held, client credentials otherwise.
pub fn grant_form(
    client_id: &str,
    client_secret: &str,
    refresh_token: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("client_id", client_id.to_string()),
        ("client_secret", client_secret.to_string()),
    ];
    match refresh_token {
        Some(token) => {
            form.push(("grant_type", "refresh_token".to_string()));
            form.push(("refresh_token", token.to_string()));
        }
        None => {
            form.push(("grant_type", "client_credentials".to_string()));
            form.push(("scope", APPSTORE_SCOPE.to_string()));
        }
    }
    form
}
