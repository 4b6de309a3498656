//! Session token verification.
//!
//! Tokens are HS256 JWTs issued by the login flow. They arrive either in the
//! session cookie or as an `Authorization: Bearer` header.

use crate::errors::ApiError;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use upstream::types::MemberScope;

/// Quota type of tenants that are not metered.
pub const UNMETERED_QUOTA_TYPE: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub company_id: u64,
    pub member_id: u64,
    pub role_id: u64,
    pub tier_level: u64,
    pub quota_type: String,
    pub api_key: String,
    pub exp: u64,
}

/// The verified identity of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub company_id: u64,
    pub member_id: u64,
    pub role_id: u64,
    pub tier_level: u64,
    pub quota_type: String,
    pub api_key: String,
}

impl AuthContext {
    pub fn scope(&self) -> MemberScope {
        MemberScope {
            member_id: self.member_id,
            company_id: self.company_id,
            tier_level: self.tier_level,
        }
    }

    pub fn is_metered(&self) -> bool {
        self.quota_type != UNMETERED_QUOTA_TYPE
    }
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        AuthContext {
            company_id: claims.company_id,
            member_id: claims.member_id,
            role_id: claims.role_id,
            tier_level: claims.tier_level,
            quota_type: claims.quota_type,
            api_key: claims.api_key,
        }
    }
}

pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

impl SessionVerifier {
    pub fn new(secret: &str, cookie_name: impl Into<String>) -> Self {
        SessionVerifier {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            cookie_name: cookie_name.into(),
        }
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
        let token = self.token(headers).ok_or_else(unauthorized)?;

        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(data.claims.into()),
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                Err(unauthorized())
            }
        }
    }

    fn token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let from_cookie = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value);

        from_cookie
            .or_else(|| {
                headers
                    .get(AUTHORIZATION)?
                    .to_str()
                    .ok()?
                    .strip_prefix("Bearer ")
            })
            .filter(|token| !token.is_empty())
    }
}

fn unauthorized() -> ApiError {
    ApiError::Unauthorized("invalid or missing session token".to_string())
}
