//! Bearer-token authentication (interface layer)
//!
//! Authentication is a collaborator of the purchase pipeline, not part of
//! it: all the core needs is a verified `userId` and `role`. Tokens are
//! HMAC-signed JWTs minted by the passwordless login endpoint.

pub mod middleware;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::models::{Role, User};
use crate::core_types::UserId;
use crate::error::PurchaseError;

/// JWT claims carried by every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller, injected into request extensions by the
/// auth middleware.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl AuthedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub struct AuthService {
    secret: String,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            token_ttl: Duration::from_secs(24 * 3600),
        }
    }

    /// Mint a token for a user.
    pub fn issue(&self, user: &User) -> Result<String, PurchaseError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.user_id,
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + self.token_ttl.as_secs() as i64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| PurchaseError::Internal(format!("token encode: {}", e)))
    }

    /// Verify a token and extract the caller identity.
    pub fn verify(&self, token: &str) -> Result<AuthedUser, PurchaseError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| PurchaseError::Unauthorized)?;

        Ok(AuthedUser {
            user_id: data.claims.sub,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(role: Role) -> User {
        User {
            user_id: Uuid::new_v4(),
            email: "shopper@example.com".into(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let auth = AuthService::new("test-secret".into());
        let user = user(Role::User);
        let token = auth.issue(&user).unwrap();

        let authed = auth.verify(&token).unwrap();
        assert_eq!(authed.user_id, user.user_id);
        assert_eq!(authed.email, user.email);
        assert!(!authed.is_admin());
    }

    #[test]
    fn test_admin_role_carried() {
        let auth = AuthService::new("test-secret".into());
        let token = auth.issue(&user(Role::Admin)).unwrap();
        assert!(auth.verify(&token).unwrap().is_admin());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let auth = AuthService::new("test-secret".into());
        let token = auth.issue(&user(Role::User)).unwrap();

        let other = AuthService::new("other-secret".into());
        assert!(matches!(
            other.verify(&token),
            Err(PurchaseError::Unauthorized)
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let auth = AuthService::new("test-secret".into());
        assert!(auth.verify("not.a.token").is_err());
    }
}
