use anyhow::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn sign_hex(secret: &str, message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a hex HMAC-SHA256 against `message`.
pub fn verify_hex(secret: &str, message: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

/// Splits a `t=<unix>,v1=<hex>` header.
pub fn parse_timestamped_header(header: &str) -> Option<(String, String)> {
    let mut timestamp: Option<String> = None;
    let mut signature: Option<String> = None;

    for part in header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = Some(rest.to_string());
        } else if let Some(rest) = part.strip_prefix("v1=") {
            signature = Some(rest.to_string());
        }
    }

    Some((timestamp?, signature?))
}
