use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::{
    auth::{IssuedToken, SessionTokens},
    error::AppError,
    token::TokenFields,
};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Who is signed in, handed to dashboard handlers by the session middleware
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
}

impl From<TokenFields> for Session {
    fn from(fields: TokenFields) -> Self {
        Self {
            email: fields.email,
        }
    }
}

fn cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> Result<Cookie<'static>, AppError> {
    let secure = if secure { "; Secure" } else { "" };
    let raw = format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{secure}"
    );
    Cookie::parse(raw).map_err(AppError::internal)
}

/// HttpOnly credential living exactly as long as the token inside it
pub fn credential_cookie(name: &str, token: &IssuedToken, secure: bool) -> Result<Cookie<'static>, AppError> {
    cookie(name, &token.value, token.valid_for.as_secs(), secure)
}

pub fn set_session(jar: CookieJar, tokens: &SessionTokens, secure: bool) -> Result<CookieJar, AppError> {
    Ok(jar
        .add(credential_cookie(ACCESS_COOKIE, &tokens.access, secure)?)
        .add(credential_cookie(REFRESH_COOKIE, &tokens.refresh, secure)?))
}

pub fn clear_session(jar: CookieJar, secure: bool) -> Result<CookieJar, AppError> {
    Ok(jar
        .add(cookie(ACCESS_COOKIE, "", 0, secure)?)
        .add(cookie(REFRESH_COOKIE, "", 0, secure)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_credential_cookie_attributes() {
        let token = IssuedToken {
            value: "abc.def.ghi".to_string(),
            valid_for: Duration::from_secs(900),
        };

        let rendered = credential_cookie(ACCESS_COOKIE, &token, false).unwrap().to_string();
        assert!(rendered.starts_with("access_token=abc.def.ghi"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Max-Age=900"));
        assert!(!rendered.contains("Secure"));

        let secure = credential_cookie(ACCESS_COOKIE, &token, true).unwrap().to_string();
        assert!(secure.contains("Secure"));
    }
}
