//! Webhook signature verification (§4.10 step 2) — HMAC-SHA256 over the
//! raw body, compared in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-parallax-signature";
/// Accepted for compatibility with webhook senders that speak the GitHub
/// convention.
pub const COMPAT_SIGNATURE_HEADER: &str = "x-hub-signature-256";

pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of the computed signature against a header
/// value that may or may not carry the `sha256=` prefix.
pub fn verify(body: &[u8], secret: &str, header_value: &str) -> bool {
    let expected = sign(body, secret);
    let header_value = if header_value.starts_with("sha256=") {
        header_value.to_string()
    } else {
        format!("sha256={header_value}")
    };
    expected.as_bytes().ct_eq(header_value.as_bytes()).into()
}
