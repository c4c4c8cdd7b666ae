//! Request signing for the management Web API.
//!
//! `X-Zend-Signature: <key name>; <hex HMAC-SHA256>` over
//! `host:port:path:user-agent:date`, where `date` is the exact value sent in
//! the `Date` header.

use crate::error::{DeployError, DeployResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Write;
use time::{macros::format_description, OffsetDateTime, UtcOffset};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const SIGNATURE_HEADER: &str = "X-Zend-Signature";

/// RFC 1123 date in GMT, e.g. `Sun, 18 Oct 2026 09:05:03 GMT`.
pub(crate) fn request_date(now: OffsetDateTime) -> DeployResult<String> {
    let fmt = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    now.to_offset(UtcOffset::UTC)
        .format(&fmt)
        .map_err(|e| DeployError::InvalidRequest(format!("cannot format request date: {e}")))
}

pub(crate) fn signature_header(
    key_name: &str,
    key_secret: &str,
    host: &str,
    path: &str,
    user_agent: &str,
    date: &str,
) -> DeployResult<String> {
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes())
        .map_err(|e| DeployError::Config(format!("unusable API key secret: {e}")))?;
    mac.update(format!("{host}:{path}:{user_agent}:{date}").as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut hex = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(hex, "{b:02x}");
    }
    Ok(format!("{key_name}; {hex}"))
}
