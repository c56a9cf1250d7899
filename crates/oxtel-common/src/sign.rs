//! HMAC-SHA256 body signing for the `HashSHA256` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs `body` with `key`, returning the MAC as lowercase hex.
pub fn sign(body: &[u8], key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a received hex signature against `body`. The comparison is
/// constant-time for equal-length MACs; malformed hex fails outright.
pub fn verify(body: &[u8], key: &str, signature_hex: &str) -> bool {
    let Ok(received) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&received).is_ok()
}
