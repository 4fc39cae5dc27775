pub mod password;
pub mod rate_limit;

use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::{
    db::{StoreError, UserRepository, models::NewUser},
    mail::{Mailer, OutgoingMail},
    token::{TokenCodec, TokenError, TokenFields, TokenKind},
    views::Views,
};
use password::PasswordHasher;
use rate_limit::RateLimiter;

pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Refresh lifetime multiplier when "remember me" is ticked (~30 days)
pub const REMEMBER_ME_FACTOR: u32 = 30;
pub const REGISTRATION_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

const CONFIRMATION_SUBJECT: &str = "Confirm Lockbox Email";

/// Verified against when the email is unknown so both login failures cost one hash check
const DUMMY_PASSWORD: &str = "lockbox-dummy-password";

#[derive(Debug, Error)]
pub enum AuthError {
    // Both login failures share one message so callers cannot enumerate accounts
    #[error("invalid email and/or password")]
    UserNotFound,
    #[error("invalid email and/or password")]
    BadPassword,
    #[error("refresh token is invalid")]
    InvalidRefreshToken,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("registration token is invalid")]
    InvalidRegistrationToken,
    #[error("one or more fields are empty")]
    IncompleteRegistration,
    #[error("email already in use")]
    DuplicateEmail,
    #[error("too many registration attempts, try again later")]
    RateLimited,
    #[error("user store failed")]
    Store(#[source] StoreError),
    #[error("failed to issue token")]
    Token(#[source] TokenError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A signed token plus how long the credential carrying it should live
#[derive(Clone)]
pub struct IssuedToken {
    pub value: String,
    pub valid_for: Duration,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("value", &"<redacted>")
            .field("valid_for", &self.valid_for)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Outcome of checking a request's credentials
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: TokenFields,
    /// Set when the access credential was re-minted from the refresh credential
    pub refreshed: Option<IssuedToken>,
}

#[derive(Clone)]
pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

impl RegistrationRequest {
    fn is_complete(&self) -> bool {
        [&self.email, &self.password, &self.first_name, &self.last_name]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// Where confirmation emails come from and where their links point
#[derive(Debug, Clone)]
pub struct ConfirmationMail {
    pub public_url: String,
    pub from: String,
}

/// Login, silent refresh, access validation and the registration flow
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    codec: TokenCodec,
    hasher: Arc<dyn PasswordHasher>,
    signup_limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn Mailer>,
    views: Arc<Views>,
    confirmation: ConfirmationMail,
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        codec: TokenCodec,
        hasher: Arc<dyn PasswordHasher>,
        signup_limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn Mailer>,
        views: Arc<Views>,
        confirmation: ConfirmationMail,
    ) -> Self {
        Self {
            users,
            codec,
            hasher,
            signup_limiter,
            mailer,
            views,
            confirmation,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Check email and password, then issue an access/refresh pair
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<SessionTokens, AuthError> {
        let Some(user) = self
            .users
            .find_user_by_email(email)
            .await
            .map_err(AuthError::Store)?
        else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| self.hasher.hash(DUMMY_PASSWORD))
                .await?;
            self.hasher.verify(dummy, password).await?;
            return Err(AuthError::UserNotFound);
        };

        if !self.hasher.verify(&user.password_hash, password).await? {
            return Err(AuthError::BadPassword);
        }

        let identity = TokenFields::new(
            TokenKind::Access,
            user.email,
            user.first_name,
            user.last_name,
        );

        tracing::info!(email = %identity.email, remember_me, "User logged in");
        self.issue_session(&identity, remember_me)
    }

    /// Accept only a valid token of kind `access`
    pub fn validate_access(&self, token: &str) -> Result<TokenFields, AuthError> {
        let claims = self
            .codec
            .parse(token)
            .map_err(|_| AuthError::Unauthenticated)?;

        if claims.kind() != TokenKind::Access {
            return Err(AuthError::Unauthenticated);
        }

        Ok(claims.fields)
    }

    /// Mint a fresh access token from a refresh token
    pub fn refresh(&self, refresh_token: &str) -> Result<(TokenFields, IssuedToken), AuthError> {
        let claims = self
            .codec
            .parse(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        if claims.kind() != TokenKind::Refresh {
            return Err(AuthError::InvalidRefreshToken);
        }

        let identity = claims.fields.rekind(TokenKind::Access);
        let access = self.issue(identity.clone(), ACCESS_TOKEN_TTL)?;

        Ok((identity, access))
    }

    /// Validate the access credential, falling back to a silent refresh when
    /// it is absent or unusable and a refresh credential is present.
    pub fn authenticate(
        &self,
        access: Option<&str>,
        refresh: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        if let Some(token) = access {
            match self.validate_access(token) {
                Ok(identity) => {
                    return Ok(Authenticated {
                        identity,
                        refreshed: None,
                    });
                }
                Err(_) => tracing::debug!("Access credential rejected"),
            }
        }

        let refresh = refresh.ok_or(AuthError::Unauthenticated)?;
        let (identity, access) = self.refresh(refresh)?;
        tracing::debug!(email = %identity.email, "Refreshed access credential");

        Ok(Authenticated {
            identity,
            refreshed: Some(access),
        })
    }

    /// Start a registration: rate limit per client, then email a signed
    /// registration token. Nothing is written to the store here.
    pub async fn begin_registration(
        &self,
        client: &str,
        request: RegistrationRequest,
    ) -> Result<(), AuthError> {
        if !request.is_complete() {
            return Err(AuthError::IncompleteRegistration);
        }

        if !self.signup_limiter.take(client).await? {
            tracing::warn!(client, "Registration rate limit exceeded");
            return Err(AuthError::RateLimited);
        }

        let existing = self
            .users
            .find_user_by_email(&request.email)
            .await
            .map_err(AuthError::Store)?;
        if existing.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let fields = TokenFields::new(
            TokenKind::Registration,
            &request.email,
            &request.first_name,
            &request.last_name,
        )
        .with_password(request.password);
        let token = self.issue(fields, REGISTRATION_TOKEN_TTL)?;

        let url = format!(
            "{}/app/confirmemail/{}",
            self.confirmation.public_url.trim_end_matches('/'),
            token.value
        );

        self.mailer
            .send_mail(OutgoingMail {
                from: self.confirmation.from.clone(),
                to: request.email.clone(),
                subject: CONFIRMATION_SUBJECT.to_string(),
                html_body: self.views.confirmation_email(&url),
            })
            .await?;

        tracing::info!(email = %request.email, "Sent registration confirmation");
        Ok(())
    }

    /// Create the account described by a registration token and log it in
    pub async fn confirm_registration(&self, token: &str) -> Result<SessionTokens, AuthError> {
        let claims = self
            .codec
            .parse(token)
            .map_err(|_| AuthError::InvalidRegistrationToken)?;

        if claims.kind() != TokenKind::Registration {
            return Err(AuthError::InvalidRegistrationToken);
        }

        let fields = claims.fields;
        let password = fields
            .password
            .as_deref()
            .ok_or(AuthError::InvalidRegistrationToken)?;

        let password_hash = self.hasher.hash(password).await?;

        let user = self
            .users
            .create_user(NewUser {
                email: fields.email.clone(),
                password_hash,
                first_name: fields.first_name.clone(),
                last_name: fields.last_name.clone(),
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => AuthError::DuplicateEmail,
                other => AuthError::Store(other),
            })?;

        tracing::info!(user_id = %user.user_id, email = %user.email, "Created user");
        self.issue_session(&fields.rekind(TokenKind::Access), false)
    }

    fn issue_session(
        &self,
        identity: &TokenFields,
        remember_me: bool,
    ) -> Result<SessionTokens, AuthError> {
        let refresh_ttl = if remember_me {
            REFRESH_TOKEN_TTL * REMEMBER_ME_FACTOR
        } else {
            REFRESH_TOKEN_TTL
        };

        Ok(SessionTokens {
            access: self.issue(identity.rekind(TokenKind::Access), ACCESS_TOKEN_TTL)?,
            refresh: self.issue(identity.rekind(TokenKind::Refresh), refresh_ttl)?,
        })
    }

    fn issue(&self, fields: TokenFields, valid_for: Duration) -> Result<IssuedToken, AuthError> {
        let value = self
            .codec
            .issue(fields, valid_for)
            .map_err(AuthError::Token)?;

        Ok(IssuedToken { value, valid_for })
    }
}
