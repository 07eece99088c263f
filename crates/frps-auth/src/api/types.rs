//! API request and response types.

use crate::error::AuthError;
use crate::handshake::Decision;
use crate::lifecycle::NewAuthorization;
use crate::record::AuthRecord;
use serde::{Deserialize, Serialize};

/// Request to provision an authorization record.
#[derive(Debug, Deserialize)]
pub struct AddAuthRequest {
    pub proxy_name: String,

    pub proxy_type: String,

    #[serde(default)]
    pub remote_port: u16,

    /// Subdomain for http/https proxies; defaults to the proxy name
    pub subdomain: Option<String>,

    /// Expiry in epoch milliseconds
    pub auth_valid_to: i64,

    #[serde(default)]
    pub memo: String,

    /// Replace an existing record with the same id
    #[serde(default)]
    pub overwrite: bool,
}

impl TryFrom<AddAuthRequest> for NewAuthorization {
    type Error = AuthError;

    fn try_from(request: AddAuthRequest) -> Result<Self, Self::Error> {
        Ok(NewAuthorization {
            proxy_type: request.proxy_type.parse().map_err(AuthError::BadRequest)?,
            proxy_name: request.proxy_name,
            remote_port: request.remote_port,
            subdomain: request.subdomain,
            valid_until: request.auth_valid_to,
            memo: request.memo,
            overwrite: request.overwrite,
        })
    }
}

/// Request to change a record's expiry and memo.
#[derive(Debug, Deserialize)]
pub struct UpdateAuthRequest {
    pub id: String,

    /// New expiry in epoch milliseconds
    pub auth_valid_to: i64,

    #[serde(default)]
    pub memo: String,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: i32,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: 0 }
    }
}

/// Response after provisioning a record.
#[derive(Debug, Serialize)]
pub struct AddAuthResponse {
    pub status: i32,
    pub id: String,
}

/// All stored records.
#[derive(Debug, Serialize)]
pub struct ListAuthResponse {
    pub code: i32,
    pub count: usize,
    pub data: Vec<AuthRecord>,
}

/// Handshake answer for the tunnel server.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub reject: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unchange: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl From<Decision> for HandshakeResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => Self {
                reject: false,
                unchange: Some(true),
                reject_reason: None,
            },
            Decision::Rejected(reason) => Self {
                reject: true,
                unchange: None,
                reject_reason: Some(reason.to_string()),
            },
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub record_count: usize,
}
