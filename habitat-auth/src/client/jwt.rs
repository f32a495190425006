use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Expiry (`exp` claim) of a JWT access credential.
///
/// The signature is not checked: the server remains the authority, this only
/// decides whether the stored token is worth presenting without a refresh.
/// Returns `None` for anything that is not a three-part token with a numeric
/// `exp`.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;

    DateTime::from_timestamp(claims.exp, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::unsigned_jwt;

    #[test]
    fn test_decode_expiry() {
        let token = unsigned_jwt(1_900_000_000);
        assert_eq!(decode_expiry(&token).map(|t| t.timestamp()), Some(1_900_000_000));
    }

    #[test]
    fn test_rejects_opaque_tokens() {
        assert_eq!(decode_expiry("opaque-token"), None);
        assert_eq!(decode_expiry("a.b"), None);
        assert_eq!(decode_expiry("a.%%%.c"), None);
        assert_eq!(decode_expiry("a.b.c.d"), None);
    }

    #[test]
    fn test_requires_exp_claim() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u"}"#);
        assert_eq!(decode_expiry(&format!("e30.{}.sig", payload)), None);
    }
}
