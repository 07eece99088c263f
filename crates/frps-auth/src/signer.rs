//! Keyed signatures over canonical record forms.

use crate::record::escape;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Derives record signatures with HMAC-SHA-256 keyed by the process salt.
pub struct Signer {
    /// MAC state keyed with the salt, cloned for every signature
    keyed: HmacSha256,
}

impl Signer {
    /// Create a signer from the configured salt.
    pub fn new(salt: &SecretString) -> Result<Self, InvalidLength> {
        let keyed = <HmacSha256 as Mac>::new_from_slice(salt.expose_secret().as_bytes())?;
        Ok(Self { keyed })
    }

    /// Sign a canonical string together with a record's secret material.
    ///
    /// Returns the lowercase hex digest.
    pub fn sign(&self, canonical: &str, secret: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(canonical.as_bytes());
        mac.update(b"|sk=");
        mac.update(escape(secret).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Compare a stored signature with a recomputed one in constant time.
    pub fn matches(expected: &str, actual: &str) -> bool {
        if expected.len() != actual.len() {
            return false;
        }
        expected.as_bytes().ct_eq(actual.as_bytes()).into()
    }
}
