//! frps-auth - proxy registration authorization for frp servers.
//!
//! The tunnel server forwards every proxy registration to this service,
//! which accepts it only when the client presents the secret and expiry
//! issued for that proxy by an administrator:
//! - Administrators provision, update, disable and delete records
//! - Each record carries an HMAC signature over its target and expiry
//! - Registrations are verified against the stored signature, expiry and disabled flag

pub mod api;
pub mod config;
pub mod error;
pub mod handshake;
pub mod lifecycle;
pub mod record;
pub mod render;
pub mod signer;
pub mod store;

pub use config::Config;
pub use error::AuthError;
pub use handshake::{Decision, Handshake, RejectReason};
pub use lifecycle::{Authorizations, NewAuthorization};
pub use record::{AuthRecord, ProxyCategory};
pub use signer::Signer;
pub use store::{open_store, RecordStore, StoreError};
