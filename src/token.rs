//! Bearer tokens signed with a per-user secret.
//!
//! Each user gets a random secret at registration. Tokens are HS512 JWTs whose
//! header `kid` names the user, which selects the stored secret to verify with.
//! Nothing in the claims is trusted until the signature has been checked.

use crate::model::User;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

pub const SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Symmetric key a single user's tokens are signed and verified with.
pub struct SigningKey(String);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserClaim {
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub user: UserClaim,
    pub iat: i64,
}

pub struct TokenService {
    validation: Validation,
}

impl TokenService {
    pub fn new() -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        // Tokens do not expire.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        TokenService { validation }
    }

    /// Fresh random key material for a new user.
    pub fn generate_secret() -> Vec<u8> {
        let mut secret = vec![0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        secret
    }

    pub fn derive_secret(material: &[u8]) -> SigningKey {
        SigningKey(hex::encode(Sha512::digest(material)))
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        let key = Self::derive_secret(&user.signing_secret);
        let mut header = Header::new(Algorithm::HS512);
        header.kid = Some(user.username.clone());
        let claims = Claims {
            user: UserClaim {
                username: user.username.clone(),
            },
            iat: Utc::now().timestamp(),
        };
        debug!("Issuing token for user {}", user.username);
        encode(&header, &claims, &EncodingKey::from_secret(key.0.as_bytes()))
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Name of the user whose secret the token claims to be signed with.
    pub fn key_id(&self, token: &str) -> Result<String, TokenError> {
        decode_header(token)
            .map_err(|err| TokenError::InvalidToken(err.to_string()))?
            .kid
            .ok_or_else(|| TokenError::InvalidToken("missing key id".to_owned()))
    }

    pub fn verify(&self, token: &str, key: &SigningKey) -> Result<Claims, TokenError> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(key.0.as_bytes()),
            &self.validation,
        )
        .map_err(|err| TokenError::InvalidToken(err.to_string()))?;
        if decoded.header.kid.as_deref() != Some(decoded.claims.user.username.as_str()) {
            return Err(TokenError::InvalidToken(
                "key id does not match claimed user".to_owned(),
            ));
        }
        Ok(decoded.claims)
    }
}

impl Default for TokenService {
    fn default() -> Self {
        TokenService::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str) -> User {
        User {
            username: username.to_owned(),
            password: "hunter2".to_owned(),
            signing_secret: TokenService::generate_secret(),
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = TokenService::derive_secret(b"material");
        let b = TokenService::derive_secret(b"material");
        let c = TokenService::derive_secret(b"other");
        assert_eq!(a.0, b.0);
        assert_ne!(a.0, c.0);
        // 512-bit digest, hex encoded
        assert_eq!(a.0.len(), 128);
    }

    #[test]
    fn issued_token_verifies_with_owners_key() {
        let service = TokenService::new();
        let alice = user("alice");
        let token = service.issue(&alice).unwrap();
        assert_eq!(service.key_id(&token).unwrap(), "alice");
        let key = TokenService::derive_secret(&alice.signing_secret);
        let claims = service.verify(&token, &key).unwrap();
        assert_eq!(claims.user.username, "alice");
    }

    #[test]
    fn token_does_not_carry_password() {
        let service = TokenService::new();
        let alice = user("alice");
        let token = service.issue(&alice).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        assert!(!payload.is_empty());
        assert!(!token.contains("hunter2"));
    }

    #[test]
    fn other_users_key_rejects() {
        let service = TokenService::new();
        let alice = user("alice");
        let bob = user("bob");
        let token = service.issue(&alice).unwrap();
        let key = TokenService::derive_secret(&bob.signing_secret);
        assert!(matches!(
            service.verify(&token, &key),
            Err(TokenError::InvalidToken(_))
        ));
    }

    #[test]
    fn kid_must_match_claimed_user() {
        let service = TokenService::new();
        let alice = user("alice");
        let key = TokenService::derive_secret(&alice.signing_secret);
        let mut header = Header::new(Algorithm::HS512);
        header.kid = Some("alice".to_owned());
        let claims = Claims {
            user: UserClaim {
                username: "bob".to_owned(),
            },
            iat: 0,
        };
        let token = encode(&header, &claims, &EncodingKey::from_secret(key.0.as_bytes())).unwrap();
        assert!(service.verify(&token, &key).is_err());
    }

    #[test]
    fn malformed_token_rejected() {
        let service = TokenService::new();
        assert!(service.key_id("invalid.token.here").is_err());
        let key = TokenService::derive_secret(b"x");
        assert!(service.verify("invalid.token.here", &key).is_err());
    }
}
