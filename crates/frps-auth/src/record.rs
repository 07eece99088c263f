//! Authorization records, the record key rule and the canonical signing form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key prefix shared by `http` and `https` records.
const DOMAIN_KEY_MARKER: &str = "http-s";

/// Canonical placeholder standing in for both web schemes.
const DOMAIN_SCHEME_PLACEHOLDER: &str = "http[s]";

/// Proxy category as reported by the tunnel server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProxyCategory {
    Tcp,
    Udp,
    Http,
    Https,
    Stcp,
    Xtcp,
    Sudp,
}

impl ProxyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyCategory::Tcp => "tcp",
            ProxyCategory::Udp => "udp",
            ProxyCategory::Http => "http",
            ProxyCategory::Https => "https",
            ProxyCategory::Stcp => "stcp",
            ProxyCategory::Xtcp => "xtcp",
            ProxyCategory::Sudp => "sudp",
        }
    }

    /// Domain-based categories are addressed by subdomain, not port.
    pub fn is_domain_based(&self) -> bool {
        matches!(self, ProxyCategory::Http | ProxyCategory::Https)
    }

    /// Secret (visitor) categories.
    pub fn is_virtual_circuit(&self) -> bool {
        matches!(
            self,
            ProxyCategory::Stcp | ProxyCategory::Xtcp | ProxyCategory::Sudp
        )
    }
}

impl fmt::Display for ProxyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(ProxyCategory::Tcp),
            "udp" => Ok(ProxyCategory::Udp),
            "http" => Ok(ProxyCategory::Http),
            "https" => Ok(ProxyCategory::Https),
            "stcp" => Ok(ProxyCategory::Stcp),
            "xtcp" => Ok(ProxyCategory::Xtcp),
            "sudp" => Ok(ProxyCategory::Sudp),
            other => Err(format!("Unsupported proxy type: {}", other)),
        }
    }
}

/// A provisioned authorization record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthRecord {
    /// Derived record key, see [`build_key`]
    pub id: String,

    /// Administrator-chosen proxy name
    pub proxy_name: String,

    /// Proxy category
    pub proxy_type: ProxyCategory,

    /// Remote port (0 for domain-based categories)
    pub remote_port: u16,

    /// Subdomain (empty for port-based categories)
    #[serde(default)]
    pub subdomain: String,

    /// Expiry in epoch milliseconds
    #[serde(rename = "auth_valid_to")]
    pub valid_until: i64,

    /// Free-form administrator note
    #[serde(default)]
    pub memo: String,

    /// Server-generated secret material ("auth key")
    #[serde(rename = "auth_key")]
    pub secret: String,

    /// Hex signature over the canonical form
    #[serde(rename = "sign")]
    pub signature: String,

    /// Disabled records never pass verification
    #[serde(default)]
    pub disabled: bool,
}

impl AuthRecord {
    /// Canonical signing form of this record's signed fields.
    pub fn canonical(&self) -> String {
        canonicalize(
            self.proxy_type,
            &self.proxy_name,
            self.remote_port,
            &self.subdomain,
            self.valid_until,
        )
    }

    /// Whether the record has expired at `now_ms` (epoch milliseconds).
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.valid_until
    }
}

/// Normalize port and subdomain so that ignored fields cannot influence keys or signatures.
///
/// Virtual-circuit clients never send a remote port, so theirs is always 0.
pub fn normalize_target(category: ProxyCategory, remote_port: u16, subdomain: &str) -> (u16, String) {
    if category.is_domain_based() {
        (0, subdomain.to_string())
    } else if category.is_virtual_circuit() {
        (0, String::new())
    } else {
        (remote_port, String::new())
    }
}

/// Derive the record key for a proxy.
///
/// `http` and `https` proxies share a key per subdomain; every other
/// category is keyed by its literal name, proxy name and port.
pub fn build_key(
    category: ProxyCategory,
    proxy_name: &str,
    remote_port: u16,
    subdomain: &str,
) -> String {
    if category.is_domain_based() {
        format!("{}-{}", DOMAIN_KEY_MARKER, subdomain)
    } else {
        format!("{}-{}-{}", category, proxy_name, remote_port)
    }
}

/// Build the canonical signing string for a proxy.
///
/// The proxy name is not part of the signed form; it only takes part in
/// the record key.
pub fn canonicalize(
    category: ProxyCategory,
    _proxy_name: &str,
    remote_port: u16,
    subdomain: &str,
    valid_until: i64,
) -> String {
    if category.is_domain_based() {
        format!(
            "pt={}|sb={}|vt={}",
            escape(DOMAIN_SCHEME_PLACEHOLDER),
            escape(subdomain),
            valid_until
        )
    } else {
        format!(
            "pt={}|rp={}|vt={}",
            escape(category.as_str()),
            remote_port,
            valid_until
        )
    }
}

/// Escape the canonical delimiters inside a field value.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '|' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
