//! GitHub webhook signature verification using HMAC-SHA1.
//!
//! GitHub signs push deliveries with the hook's shared secret and sends the
//! result in the `X-Hub-Signature` header as `sha1=<hex>`. The digest covers
//! the raw request body exactly as received.
//!
//! When no secret is configured every delivery is accepted. The server logs a
//! warning about this at startup.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Algorithm prefix of the signature header.
const SIGNATURE_PREFIX: &str = "sha1=";

/// Decodes a `sha1=<hex>` header into the raw digest, or `None` if it is
/// malformed.
///
/// # Examples
///
/// ```
/// use gh2lp::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha1=abcd1234").is_some());
///
/// // Invalid: missing prefix
/// assert!(parse_signature_header("abcd1234").is_none());
///
/// // Invalid: other algorithm
/// assert!(parse_signature_header("sha256=abcd1234").is_none());
///
/// // Invalid: bad hex
/// assert!(parse_signature_header("sha1=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix(SIGNATURE_PREFIX)?;
    hex::decode(hex_sig).ok()
}

/// HMAC-SHA1 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(signature))
}

/// Checks a `sha1=<hex>` header against the payload in constant time.
///
/// # Examples
///
/// ```
/// use gh2lp::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let payload = b"Hello, World!";
/// let secret = b"my-secret-key";
///
/// let header = format_signature_header(&compute_signature(payload, secret));
///
/// assert!(verify_signature(payload, &header, secret));
/// assert!(!verify_signature(payload, &header, b"wrong-secret"));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    HmacSha1::new_from_slice(secret)
        .map(|mac| mac.chain_update(payload).verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

/// Authenticates a delivery.
///
/// * No secret: always `true` (authentication disabled).
/// * Secret but no header: `false`.
/// * Otherwise: [`verify_signature`].
pub fn verify(secret: Option<&[u8]>, payload: &[u8], signature_header: Option<&str>) -> bool {
    match (secret, signature_header) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(secret), Some(header)) => verify_signature(payload, header, secret),
    }
}
