use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Issuer stamped into every token and required when parsing
pub const ISSUER: &str = "lockbox";

/// The only signing algorithm the server issues or accepts
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Not-before is backdated by this many seconds to tolerate clock skew
const CLOCK_SKEW_SECS: i64 = 30;

/// What a token is allowed to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Registration,
}

/// Identity and intent carried inside a token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFields {
    #[serde(rename = "token_type")]
    pub kind: TokenKind,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Plaintext password, only ever present on registration tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl TokenFields {
    pub fn new(
        kind: TokenKind,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Same identity under a different kind. The password never carries over.
    pub fn rekind(&self, kind: TokenKind) -> Self {
        Self::new(kind, &self.email, &self.first_name, &self.last_name)
    }
}

impl fmt::Debug for TokenFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenFields")
            .field("kind", &self.kind)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Full claim set: custom fields plus the registered claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub fields: TokenFields,
}

impl Claims {
    pub fn kind(&self) -> TokenKind {
        self.fields.kind
    }

    /// Seconds between issue and expiry
    #[cfg(test)]
    pub fn lifetime_secs(&self) -> i64 {
        self.exp - self.iat
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("token issuer is not recognised")]
    WrongIssuer,
    #[error("token uses an unsupported signing algorithm")]
    UnsupportedAlgorithm,
    #[error("token is malformed")]
    Malformed,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidIssuer => Self::WrongIssuer,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm
            }
            _ => Self::Malformed,
        }
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Signs and verifies session tokens with the process-wide HMAC key
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &ALGORITHM)
            .field("issuer", &ISSUER)
            .finish()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a signed token carrying `fields`, valid for `valid_for` from now
    pub fn issue(&self, fields: TokenFields, valid_for: Duration) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let lifetime = i64::try_from(valid_for.as_secs()).unwrap_or(i64::MAX);

        let claims = Claims {
            iss: ISSUER.to_string(),
            jti: hex::encode(rand::random::<[u8; 16]>()),
            iat: now,
            nbf: now - CLOCK_SKEW_SECS,
            exp: now.saturating_add(lifetime),
            fields,
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm, issuer and time window. Kind is left to the caller.
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        check_algorithm(token)?;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

/// Reject anything not declaring HS256 before the token reaches the verifier,
/// including `none` which jsonwebtoken cannot even represent.
fn check_algorithm(token: &str) -> Result<(), TokenError> {
    let segment = token.split('.').next().ok_or(TokenError::Malformed)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    let header: RawHeader = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    if header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlgorithm);
    }

    Ok(())
}
