//! Verification handshake for new-proxy registration callbacks.
//!
//! The tunnel server posts every proxy lifecycle event to this service;
//! only `NewProxy` events are checked. A new proxy is accepted when
//!
//! 1. a record exists under the key derived from the proxy's fields,
//! 2. the expiry and secret the client presents reproduce the record's signature,
//! 3. the record's stored expiry has not passed, and
//! 4. the record is not disabled.

use crate::record::{build_key, canonicalize, normalize_target, AuthRecord, ProxyCategory};
use crate::signer::Signer;
use crate::store::{RecordStore, StoreError};
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Operation name of a new proxy registration.
pub const NEW_PROXY_OP: &str = "NewProxy";

/// Registration-intent message sent by the tunnel server.
///
/// The tunnel server may send `null` for any field; it reads as the default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationIntent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,

    pub op: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub content: ProxyContent,
}

/// Proxy parameters carried by a registration intent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyContent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub proxy_name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub proxy_type: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub remote_port: u16,

    #[serde(default, deserialize_with = "null_as_default")]
    pub subdomain: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metas: ClaimedCredentials,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Credentials the tunnel client presents through proxy metadata.
#[derive(Clone, Default, Deserialize)]
pub struct ClaimedCredentials {
    /// Claimed expiry, epoch milliseconds as a decimal string
    #[serde(default, alias = "valid_to")]
    pub auth_valid_to: Option<String>,

    /// Claimed secret material
    #[serde(default)]
    pub auth_key: Option<String>,
}

impl fmt::Debug for ClaimedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimedCredentials")
            .field("auth_valid_to", &self.auth_valid_to)
            .field("auth_key", &self.auth_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Why a registration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No record exists for the derived key
    UnknownProxy,
    /// Presented credentials do not reproduce the stored signature
    SignatureMismatch,
    /// The record's stored expiry has passed
    Expired,
    /// The record is disabled
    Disabled,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::UnknownProxy => "unknown proxy",
            RejectReason::SignatureMismatch => "signature mismatch",
            RejectReason::Expired => "expired",
            RejectReason::Disabled => "disabled",
        })
    }
}

/// Outcome of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(RejectReason),
}

/// Decides whether the tunnel server may create a proxy.
#[derive(Clone)]
pub struct Handshake {
    store: Arc<dyn RecordStore>,
    signer: Arc<Signer>,
}

impl Handshake {
    pub fn new(store: Arc<dyn RecordStore>, signer: Arc<Signer>) -> Self {
        Self { store, signer }
    }

    /// Verify an intent against the current time.
    pub fn verify(&self, intent: &RegistrationIntent) -> Result<Decision, StoreError> {
        self.verify_at(intent, Utc::now().timestamp_millis())
    }

    /// Verify an intent as of `now_ms` (epoch milliseconds).
    pub fn verify_at(&self, intent: &RegistrationIntent, now_ms: i64) -> Result<Decision, StoreError> {
        if intent.op != NEW_PROXY_OP {
            debug!(op = %intent.op, "Passing through non-registration event");
            return Ok(Decision::Accepted);
        }

        let content = &intent.content;
        let decision = match content.proxy_type.parse::<ProxyCategory>() {
            Ok(category) => {
                let (remote_port, subdomain) =
                    normalize_target(category, content.remote_port, &content.subdomain);
                let id = build_key(category, &content.proxy_name, remote_port, &subdomain);

                match self.store.get(&id)? {
                    Some(record) => self.check(&record, &content.metas, now_ms),
                    None => Decision::Rejected(RejectReason::UnknownProxy),
                }
            }
            Err(_) => Decision::Rejected(RejectReason::UnknownProxy),
        };

        match decision {
            Decision::Accepted => info!(
                proxy_name = %content.proxy_name,
                proxy_type = %content.proxy_type,
                "Proxy registration accepted"
            ),
            Decision::Rejected(reason) => warn!(
                proxy_name = %content.proxy_name,
                proxy_type = %content.proxy_type,
                remote_port = content.remote_port,
                subdomain = %content.subdomain,
                %reason,
                "Proxy registration rejected"
            ),
        }

        Ok(decision)
    }

    /// Signature, expiry and disabled checks against a stored record.
    fn check(&self, record: &AuthRecord, claimed: &ClaimedCredentials, now_ms: i64) -> Decision {
        if !self.credentials_match(record, claimed) {
            return Decision::Rejected(RejectReason::SignatureMismatch);
        }
        // The stored expiry is authoritative, whatever the client claimed.
        if record.is_expired_at(now_ms) {
            return Decision::Rejected(RejectReason::Expired);
        }
        if record.disabled {
            return Decision::Rejected(RejectReason::Disabled);
        }
        Decision::Accepted
    }

    /// Re-sign the record's identity with the claimed expiry and secret.
    fn credentials_match(&self, record: &AuthRecord, claimed: &ClaimedCredentials) -> bool {
        let valid_until = claimed
            .auth_valid_to
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok());
        let (Some(valid_until), Some(secret)) = (valid_until, claimed.auth_key.as_deref()) else {
            return false;
        };

        let canonical = canonicalize(
            record.proxy_type,
            &record.proxy_name,
            record.remote_port,
            &record.subdomain,
            valid_until,
        );
        Signer::matches(&record.signature, &self.signer.sign(&canonical, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{Authorizations, NewAuthorization};
    use crate::store::MemoryStore;
    use secrecy::SecretString;

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn setup() -> (Authorizations, Handshake) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let signer = Arc::new(Signer::new(&SecretString::new("salt".into())).unwrap());
        (
            Authorizations::new(store.clone(), signer.clone()),
            Handshake::new(store, signer),
        )
    }

    fn provision(
        auths: &Authorizations,
        proxy_type: ProxyCategory,
        name: &str,
        port: u16,
        valid_until: i64,
    ) -> AuthRecord {
        auths
            .add(NewAuthorization {
                proxy_name: name.into(),
                proxy_type,
                remote_port: port,
                subdomain: None,
                valid_until,
                memo: String::new(),
                overwrite: false,
            })
            .unwrap()
    }

    fn intent(
        proxy_type: &str,
        name: &str,
        port: u16,
        subdomain: &str,
        valid_to: i64,
        key: &str,
    ) -> RegistrationIntent {
        RegistrationIntent {
            version: "0.1.0".into(),
            op: NEW_PROXY_OP.into(),
            content: ProxyContent {
                proxy_name: name.into(),
                proxy_type: proxy_type.into(),
                remote_port: port,
                subdomain: subdomain.into(),
                metas: ClaimedCredentials {
                    auth_valid_to: Some(valid_to.to_string()),
                    auth_key: Some(key.into()),
                },
            },
        }
    }

    #[test]
    fn test_other_operations_pass_through() {
        let (_, handshake) = setup();
        let event = RegistrationIntent {
            op: "Ping".into(),
            ..RegistrationIntent::default()
        };
        assert_eq!(handshake.verify_at(&event, NOW).unwrap(), Decision::Accepted);
    }

    #[test]
    fn test_port_based_scenario() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Tcp, "svc1", 6000, NOW + HOUR);

        let ok = intent("tcp", "svc1", 6000, "", record.valid_until, &record.secret);
        assert_eq!(handshake.verify_at(&ok, NOW).unwrap(), Decision::Accepted);

        let other_port = intent("tcp", "svc1", 6001, "", record.valid_until, &record.secret);
        assert_eq!(
            handshake.verify_at(&other_port, NOW).unwrap(),
            Decision::Rejected(RejectReason::UnknownProxy)
        );
    }

    #[test]
    fn test_web_schemes_collapse() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Http, "acme", 0, NOW + HOUR);

        let https = intent("https", "acme", 0, "acme", record.valid_until, &record.secret);
        assert_eq!(handshake.verify_at(&https, NOW).unwrap(), Decision::Accepted);

        let http = intent("http", "whatever", 0, "acme", record.valid_until, &record.secret);
        assert_eq!(handshake.verify_at(&http, NOW).unwrap(), Decision::Accepted);
    }

    #[test]
    fn test_expiry_boundary() {
        let (auths, handshake) = setup();
        let stale = provision(&auths, ProxyCategory::Tcp, "old", 7000, NOW - 1);
        let fresh = provision(&auths, ProxyCategory::Tcp, "new", 7001, NOW + HOUR);

        let msg = intent("tcp", "old", 7000, "", stale.valid_until, &stale.secret);
        assert_eq!(
            handshake.verify_at(&msg, NOW).unwrap(),
            Decision::Rejected(RejectReason::Expired)
        );

        let msg = intent("tcp", "new", 7001, "", fresh.valid_until, &fresh.secret);
        assert_eq!(handshake.verify_at(&msg, NOW).unwrap(), Decision::Accepted);

        // Exactly at the expiry instant the record is still valid
        assert_eq!(handshake.verify_at(&msg, fresh.valid_until).unwrap(), Decision::Accepted);
    }

    #[test]
    fn test_claimed_expiry_must_match_provisioned() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Tcp, "svc1", 6000, NOW - HOUR);

        // Claiming a later expiry than provisioned breaks the signature
        let msg = intent("tcp", "svc1", 6000, "", NOW + HOUR, &record.secret);
        assert_eq!(
            handshake.verify_at(&msg, NOW).unwrap(),
            Decision::Rejected(RejectReason::SignatureMismatch)
        );
    }

    #[test]
    fn test_wrong_or_missing_credentials() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Udp, "dns", 5353, NOW + HOUR);

        let wrong_key = intent("udp", "dns", 5353, "", record.valid_until, "guess");
        assert_eq!(
            handshake.verify_at(&wrong_key, NOW).unwrap(),
            Decision::Rejected(RejectReason::SignatureMismatch)
        );

        let mut no_metas = intent("udp", "dns", 5353, "", record.valid_until, &record.secret);
        no_metas.content.metas = ClaimedCredentials::default();
        assert_eq!(
            handshake.verify_at(&no_metas, NOW).unwrap(),
            Decision::Rejected(RejectReason::SignatureMismatch)
        );

        let mut garbled = intent("udp", "dns", 5353, "", record.valid_until, &record.secret);
        garbled.content.metas.auth_valid_to = Some("tomorrow".into());
        assert_eq!(
            handshake.verify_at(&garbled, NOW).unwrap(),
            Decision::Rejected(RejectReason::SignatureMismatch)
        );
    }

    #[test]
    fn test_disable_gate() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Stcp, "vault", 0, NOW + HOUR);
        let msg = intent("stcp", "vault", 0, "", record.valid_until, &record.secret);

        auths.disable(&record.id).unwrap();
        assert_eq!(
            handshake.verify_at(&msg, NOW).unwrap(),
            Decision::Rejected(RejectReason::Disabled)
        );

        auths.enable(&record.id).unwrap();
        assert_eq!(handshake.verify_at(&msg, NOW).unwrap(), Decision::Accepted);
    }

    #[test]
    fn test_virtual_circuit_ignores_remote_port() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Xtcp, "p2p", 7000, NOW + HOUR);
        assert_eq!(record.id, "xtcp-p2p-0");
        assert_eq!(record.remote_port, 0);

        // The rendered client config has no remote_port, so the client sends 0
        let msg = intent("xtcp", "p2p", 0, "", record.valid_until, &record.secret);
        assert_eq!(handshake.verify_at(&msg, NOW).unwrap(), Decision::Accepted);
    }

    #[test]
    fn test_update_invalidates_old_expiry() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Tcp, "svc1", 6000, NOW + HOUR);
        auths.update(&record.id, NOW + 2 * HOUR, "extended").unwrap();

        let old = intent("tcp", "svc1", 6000, "", NOW + HOUR, &record.secret);
        assert_eq!(
            handshake.verify_at(&old, NOW).unwrap(),
            Decision::Rejected(RejectReason::SignatureMismatch)
        );

        let new = intent("tcp", "svc1", 6000, "", NOW + 2 * HOUR, &record.secret);
        assert_eq!(handshake.verify_at(&new, NOW).unwrap(), Decision::Accepted);
    }

    #[test]
    fn test_unknown_category_and_deleted_record() {
        let (auths, handshake) = setup();
        let record = provision(&auths, ProxyCategory::Tcp, "svc1", 6000, NOW + HOUR);

        let msg = intent("tcpmux", "svc1", 6000, "", record.valid_until, &record.secret);
        assert_eq!(
            handshake.verify_at(&msg, NOW).unwrap(),
            Decision::Rejected(RejectReason::UnknownProxy)
        );

        auths.delete(&record.id).unwrap();
        let msg = intent("tcp", "svc1", 6000, "", record.valid_until, &record.secret);
        assert_eq!(
            handshake.verify_at(&msg, NOW).unwrap(),
            Decision::Rejected(RejectReason::UnknownProxy)
        );
    }

    #[test]
    fn test_intent_wire_format() {
        let json = r#"{
            "version": "0.1.0",
            "op": "NewProxy",
            "content": {
                "user": {"user": "", "metas": null},
                "proxy_name": "svc1",
                "proxy_type": "tcp",
                "remote_port": 6000,
                "metas": {"valid_to": "1700000000000", "auth_key": "k"}
            }
        }"#;
        let intent: RegistrationIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.op, NEW_PROXY_OP);
        assert_eq!(intent.content.remote_port, 6000);
        assert!(intent.content.subdomain.is_empty());
        assert_eq!(intent.content.metas.auth_valid_to.as_deref(), Some("1700000000000"));

        let debug = format!("{:?}", intent.content.metas);
        assert!(!debug.contains("\"k\""));
        assert_eq!(RejectReason::UnknownProxy.to_string(), "unknown proxy");
    }

    #[test]
    fn test_null_fields_read_as_defaults() {
        let login: RegistrationIntent =
            serde_json::from_str(r#"{"op": "Login", "content": {"metas": null}}"#).unwrap();
        assert_eq!(login.op, "Login");
        assert!(login.content.metas.auth_key.is_none());

        let bare: RegistrationIntent =
            serde_json::from_str(r#"{"version": null, "op": "Ping", "content": null}"#).unwrap();
        assert!(bare.version.is_empty());
        assert!(bare.content.proxy_name.is_empty());

        let (auths, handshake) = setup();
        provision(&auths, ProxyCategory::Tcp, "svc1", 6000, NOW + HOUR);
        let msg: RegistrationIntent = serde_json::from_str(
            r#"{"op": "NewProxy", "content": {"proxy_name": "svc1", "proxy_type": "tcp",
                "remote_port": 6000, "subdomain": null, "metas": null}}"#,
        )
        .unwrap();
        assert_eq!(
            handshake.verify_at(&msg, NOW).unwrap(),
            Decision::Rejected(RejectReason::SignatureMismatch)
        );
        assert_eq!(handshake.verify_at(&login, NOW).unwrap(), Decision::Accepted);
    }
}
