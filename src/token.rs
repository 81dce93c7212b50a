use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashSet;
use std::time;

use crate::domain::subscriber_email::SubscriberEmail;

const SESSION_TOKEN_TTL: time::Duration = time::Duration::from_secs(60 * 60);

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("Token signature or signing method is not valid.")]
    InvalidSignature(#[source] jsonwebtoken::errors::Error),
    #[error("Token has expired.")]
    Expired,
    #[error("Token subject is missing or empty.")]
    MalformedSubject,
    #[error("Failed to sign token.")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies stateless HS256 tokens binding a subject to an
/// optional expiry.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenService {
    pub fn new(secret: &Secret<String>, issuer: String) -> Self {
        let secret = secret.expose_secret().as_bytes();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
        }
    }

    /// Session tokens for logged-in users expire after one hour.
    pub fn issue_session_token(&self, user_id: &str) -> Result<String, TokenError> {
        self.issue(user_id, SESSION_TOKEN_TTL)
    }

    /// Unsubscribe tokens never expire: the link in a delivered email has to
    /// keep working.
    pub fn issue_subscription_token(&self, email: &SubscriberEmail) -> Result<String, TokenError> {
        self.issue(email.as_ref(), time::Duration::ZERO)
    }

    /// A zero `ttl` produces a token without `exp`.
    pub fn issue(&self, subject: &str, ttl: time::Duration) -> Result<String, TokenError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        ttl: time::Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let issued_at = now.timestamp();
        let claims = Claims {
            sub: Some(subject.to_string()),
            iss: Some(self.issuer.clone()),
            iat: Some(issued_at),
            exp: (!ttl.is_zero()).then(|| issued_at + ttl.as_secs() as i64),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Returns the subject the token was issued for.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is optional and checked against the caller's clock below
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::Json(_) => TokenError::MalformedSubject,
                _ => TokenError::InvalidSignature(err),
            })?
            .claims;

        if let Some(exp) = claims.exp {
            if now.timestamp() > exp {
                return Err(TokenError::Expired);
            }
        }

        match claims.sub {
            Some(subject) if !subject.trim().is_empty() => Ok(subject),
            _ => Err(TokenError::MalformedSubject),
        }
    }
}
