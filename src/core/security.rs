use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum IdentityError {
    #[error("token verification failed")]
    TokenDecoding,
    #[error("token encoding failed")]
    TokenEncoding,
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    /// Teachers and admins may create and manage exams.
    pub(crate) fn is_authority(&self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

/// The already-authenticated caller, as resolved by the external identity
/// provider. The engine trusts these claims; it never issues credentials.
#[derive(Debug, Clone)]
pub(crate) struct Principal {
    pub(crate) id: String,
    pub(crate) role: Role,
    pub(crate) class_id: Option<String>,
}

impl Principal {
    pub(crate) fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub(crate) fn is_authority(&self) -> bool {
        self.role.is_authority()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) class_id: Option<String>,
    pub(crate) exp: i64,
}

fn algorithm(settings: &Settings) -> Result<Algorithm, IdentityError> {
    match settings.identity().algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(IdentityError::UnsupportedAlgorithm(other.to_string())),
    }
}

pub(crate) fn verify_token(token: &str, settings: &Settings) -> Result<Principal, IdentityError> {
    let validation = Validation::new(algorithm(settings)?);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.identity().secret_key.as_bytes()),
        &validation,
    )
    .map_err(|_| IdentityError::TokenDecoding)?;

    Ok(Principal {
        id: data.claims.sub,
        role: data.claims.role,
        class_id: data.claims.class_id,
    })
}

#[cfg(test)]
pub(crate) fn issue_token(
    principal: &Principal,
    settings: &Settings,
) -> Result<String, IdentityError> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::{Duration, OffsetDateTime};

    let claims = Claims {
        sub: principal.id.clone(),
        role: principal.role,
        class_id: principal.class_id.clone(),
        exp: (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp(),
    };

    encode(
        &Header::new(algorithm(settings)?),
        &claims,
        &EncodingKey::from_secret(settings.identity().secret_key.as_bytes()),
    )
    .map_err(|_| IdentityError::TokenEncoding)
}
