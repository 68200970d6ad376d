//! Authentication lifecycle events, shared by every provider.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    Codemagic,
    Appstore,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::Codemagic => "codemagic",
            Provider::Appstore => "appstore",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEvent {
    Start { provider: Provider },
    Success { provider: Provider, account: String },
    Error { provider: Provider, message: String },
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::Start { .. } => "auth:start",
            AuthEvent::Success { .. } => "auth:success",
            AuthEvent::Error { .. } => "auth:error",
        }
    }
}
