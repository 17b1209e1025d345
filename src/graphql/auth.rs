//! GraphQL authentication gate
//!
//! Every GraphQL request passes through [AuthGate] before any resolver runs.
//! The gate reads a `Bearer` token from the `authorization` header, verifies it
//! (HS256 against the shared secret, RS256 against the optional public key),
//! checks the audience, and hands back the decoded [AuthClaims]. What happens
//! when the token is missing or invalid is decided by [AuthPolicy]:
//!
//! ```ignore
//! // reject both (default)
//! AuthPolicy { reject_on_missing_token: true, reject_on_invalid_token: true }
//! // let anonymous requests through, still refuse forged tokens
//! AuthPolicy { reject_on_missing_token: false, reject_on_invalid_token: true }
//! ```
//!
//! Verified claims are attached to the request as context data; resolvers read
//! them through [AuthExt].

use anyhow::Context as _;
use async_graphql::{Context, ErrorExtensions};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::AuthSettings;

/// Algorithms a token may be signed with
const ALLOWED_ALGORITHMS: [Algorithm; 2] = [Algorithm::HS256, Algorithm::RS256];

const BEARER_PREFIX: &str = "Bearer";

/// What to do with requests that carry no usable token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    pub reject_on_missing_token: bool,
    pub reject_on_invalid_token: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            reject_on_missing_token: true,
            reject_on_invalid_token: true,
        }
    }
}

impl AuthPolicy {
    /// Never reject; unauthenticated requests run without claims
    pub fn permissive() -> Self {
        Self {
            reject_on_missing_token: false,
            reject_on_invalid_token: false,
        }
    }
}

/// Decoded payload of a verified token, available in resolvers for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Single audience string or a list of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Any other claims the issuer added
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Unauthenticated")]
    MissingToken,

    #[error("Invalid JWT authentication token prefix.")]
    InvalidPrefix,

    #[error("Failed to decode authentication token. Verification failed: {0}")]
    InvalidToken(String),
}

impl ErrorExtensions for AuthError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| {
            e.set("code", "UNAUTHENTICATED");
        })
    }
}

/// Verifies bearer tokens and applies the configured [AuthPolicy]
pub struct AuthGate {
    hmac_key: DecodingKey,
    rsa_key: Option<DecodingKey>,
    audience: String,
    policy: AuthPolicy,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("rs256", &self.rsa_key.is_some())
            .field("audience", &self.audience)
            .field("policy", &self.policy)
            .finish()
    }
}

impl AuthGate {
    /// Build the gate from configuration. Fails on an empty secret or an unreadable public key.
    pub fn new(settings: &AuthSettings) -> anyhow::Result<Self> {
        let secret = settings.jwt_secret.trim();
        if secret.is_empty() {
            anyhow::bail!("JWT signing key is empty");
        }

        let rsa_key = settings
            .jwt_public_key
            .as_deref()
            .map(|pem| DecodingKey::from_rsa_pem(pem.as_bytes()))
            .transpose()
            .context("JWT_PUBLIC_KEY is not a valid RSA public key")?;

        Ok(Self {
            hmac_key: DecodingKey::from_secret(secret.as_bytes()),
            rsa_key,
            audience: settings.audience.clone(),
            policy: AuthPolicy {
                reject_on_missing_token: settings.reject_on_missing_token,
                reject_on_invalid_token: settings.reject_on_invalid_token,
            },
        })
    }

    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    /// Authenticate from a raw `authorization` header value (`Bearer <token>`).
    ///
    /// `Ok(None)` means the request may proceed anonymously; `Err` means it must be refused.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<Option<AuthClaims>, AuthError> {
        let Some(value) = non_empty(authorization) else {
            return self.settle_missing();
        };
        let outcome = extract_bearer(value)
            .ok_or(AuthError::InvalidPrefix)
            .and_then(|token| self.verify_token(token));
        self.settle(outcome)
    }

    /// Authenticate a bare token (no prefix), e.g. from a WebSocket `connection_init` payload.
    pub fn authenticate_token(&self, token: Option<&str>) -> Result<Option<AuthClaims>, AuthError> {
        let Some(token) = non_empty(token) else {
            return self.settle_missing();
        };
        self.settle(self.verify_token(token))
    }

    /// Verify signature, algorithm and audience of a bare token
    pub fn verify_token(&self, token: &str) -> Result<AuthClaims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "algorithm {:?} is not allowed",
                header.alg
            )));
        }

        let key = match header.alg {
            Algorithm::RS256 => self.rsa_key.as_ref().ok_or_else(|| {
                AuthError::InvalidToken("no public key configured for RS256".to_string())
            })?,
            _ => &self.hmac_key,
        };

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.audience]);
        // `exp` is checked when present but not required
        validation.set_required_spec_claims(&["aud"]);

        decode::<AuthClaims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    fn settle_missing(&self) -> Result<Option<AuthClaims>, AuthError> {
        if self.policy.reject_on_missing_token {
            debug!("Rejecting request without token");
            Err(AuthError::MissingToken)
        } else {
            Ok(None)
        }
    }

    fn settle(
        &self,
        outcome: Result<AuthClaims, AuthError>,
    ) -> Result<Option<AuthClaims>, AuthError> {
        match outcome {
            Ok(claims) => {
                debug!(subject = ?claims.sub, "Token verified");
                Ok(Some(claims))
            }
            Err(e) if self.policy.reject_on_invalid_token => {
                debug!(error = %e, "Rejecting request with invalid token");
                Err(e)
            }
            Err(e) => {
                debug!(error = %e, "Ignoring invalid token");
                Ok(None)
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Split `Bearer <token>`; any other shape is a prefix error
fn extract_bearer(value: &str) -> Option<&str> {
    let (prefix, token) = value.split_once(' ')?;
    let token = token.trim();
    (prefix == BEARER_PREFIX && !token.is_empty()).then_some(token)
}

/// Extension trait to read verified claims from GraphQL context
pub trait AuthExt {
    /// Claims of the current request, or None for anonymous requests
    fn try_claims(&self) -> Option<&AuthClaims>;
}

impl<'a> AuthExt for Context<'a> {
    fn try_claims(&self) -> Option<&AuthClaims> {
        self.data_opt::<AuthClaims>()
    }
}
