//! One-time secret generation.

use crate::error::ProvisioningError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Random bytes per secret; 18 bytes encode to exactly 24 characters.
pub const SECRET_BYTES: usize = 18;

/// A freshly generated account secret.
///
/// The plaintext is only reachable through [`RawSecret::expose`]; `Debug`
/// output is redacted.
pub struct RawSecret(SecretString);

impl RawSecret {
    /// Plaintext of the secret.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for RawSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSecret([REDACTED])")
    }
}

impl From<String> for RawSecret {
    fn from(value: String) -> Self {
        RawSecret(SecretString::new(value))
    }
}

/// Generate a URL-safe secret from the operating system's CSPRNG.
///
/// The alphabet is `[A-Za-z0-9_-]`, none of which is special in PJSIP
/// configuration files.
pub fn generate() -> Result<RawSecret, ProvisioningError> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ProvisioningError::Generator(e.to_string()))?;

    Ok(RawSecret::from(URL_SAFE_NO_PAD.encode(bytes)))
}
