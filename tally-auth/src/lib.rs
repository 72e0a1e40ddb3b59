//! Request signing for tally.
//!
//! Agents and servers that share a secret sign request and response bodies with HMAC-SHA256. The
//! hex-encoded digest travels in the [`SIGNATURE_HEADER`] header next to the body it covers.
//!
//! ```
//! let signature = tally_auth::sign(b"secret", b"[]");
//! assert!(tally_auth::verify(b"secret", b"[]", &signature).is_ok());
//! ```

#![warn(missing_docs)]

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// The name of the header carrying the hex-encoded body signature.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// The name of the header carrying the client's IP address.
///
/// Servers with a trusted subnet only admit requests whose address lies inside that subnet.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Errors raised when verifying a signature.
#[derive(Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum SignatureError {
    /// The signature header is not valid hex.
    #[error("bad signature encoding")]
    BadEncoding,

    /// The signature does not match the body.
    #[error("invalid signature on data")]
    Mismatch,
}

fn mac(secret: &[u8]) -> Hmac<Sha256> {
    Hmac::new_from_slice(secret).expect("HMAC takes variable keys")
}

/// Signs `body` with `secret` and returns the hex-encoded digest.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded `signature` of `body` in constant time.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let code = hex::decode(signature.trim()).map_err(|_| SignatureError::BadEncoding)?;

    let mut mac = mac(secret);
    mac.update(body);
    mac.verify_slice(&code)
        .map_err(|_| SignatureError::Mismatch)
}
