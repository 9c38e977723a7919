//! Bearer token authentication (spec §4.9)

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Claims carried by a bearer token issued to a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Subject: the `user_id` the token authenticates.
    pub sub: String,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("missing bearer prefix")]
    MissingPrefix,
    #[error("invalid or expired token")]
    Invalid,
}

/// Verify a raw `Authorization` header value and return the
/// authenticated `user_id`. Signature and expiry are checked by
/// `jsonwebtoken`; the `Bearer ` prefix check below uses a
/// constant-time comparison so header probing can't distinguish
/// "wrong prefix" from "right prefix, bad token" by timing.
pub fn verify_bearer_token(header_value: &str, secret: &str) -> Result<String, TokenError> {
    const PREFIX: &str = "Bearer ";
    if header_value.len() < PREFIX.len()
        || !bool::from(header_value.as_bytes()[..PREFIX.len()].ct_eq(PREFIX.as_bytes()))
    {
        return Err(TokenError::MissingPrefix);
    }
    let token = &header_value[PREFIX.len()..];

    let data = decode::<AuthClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| TokenError::Invalid)?;

    Ok(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(user_id: &str, secret: &str, exp: i64) -> String {
        let claims = AuthClaims {
            sub: user_id.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_round_trips_user_id() {
        let secret = "test-secret";
        let token = token_for("u1", secret, 9_999_999_999);
        let header = format!("Bearer {token}");
        assert_eq!(verify_bearer_token(&header, secret).unwrap(), "u1");
    }

    #[test]
    fn missing_prefix_rejected() {
        let secret = "test-secret";
        let token = token_for("u1", secret, 9_999_999_999);
        assert!(matches!(
            verify_bearer_token(&token, secret),
            Err(TokenError::MissingPrefix)
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let secret = "test-secret";
        let token = token_for("u1", secret, 1);
        let header = format!("Bearer {token}");
        assert!(matches!(verify_bearer_token(&header, secret), Err(TokenError::Invalid)));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = token_for("u1", "secret-a", 9_999_999_999);
        let header = format!("Bearer {token}");
        assert!(matches!(verify_bearer_token(&header, "secret-b"), Err(TokenError::Invalid)));
    }
}
