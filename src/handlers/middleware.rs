use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    extract::cookie::CookieJar,
    headers::{Authorization, authorization::Basic},
};

use subtle::ConstantTimeEq;

use crate::{
    app_state::AppState,
    error::AppError,
    handlers::session::{ACCESS_COOKIE, REFRESH_COOKIE, Session, clear_session, credential_cookie},
};

/// Dashboard gate: valid access credential, or a silent refresh from the
/// refresh credential. Anything else never reaches the handler.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let access = jar.get(ACCESS_COOKIE).map(|c| c.value().to_owned());
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned());
    let secure = state.config.secure_cookies;

    let authenticated = match state.auth.authenticate(access.as_deref(), refresh.as_deref()) {
        Ok(authenticated) => authenticated,
        Err(err) => {
            return match AppError::from(err) {
                AppError::Authentication(reason) => {
                    tracing::debug!(%reason, "Dashboard request not authenticated");
                    let page = state.views.login(Some("Please log in to continue"));
                    match clear_session(jar, secure) {
                        Ok(jar) => (StatusCode::UNAUTHORIZED, jar, page).into_response(),
                        Err(e) => e.into_response(),
                    }
                }
                other => other.into_response(),
            };
        }
    };

    let refreshed = match authenticated.refreshed.as_ref() {
        Some(access) => match credential_cookie(ACCESS_COOKIE, access, secure) {
            Ok(cookie) => Some(cookie),
            Err(e) => return e.into_response(),
        },
        None => None,
    };

    request
        .extensions_mut()
        .insert(Session::from(authenticated.identity));
    let response = next.run(request).await;

    match refreshed {
        Some(cookie) => (jar.add(cookie), response).into_response(),
        None => response,
    }
}

/// Device API gate: HTTP Basic against the single configured credential pair
pub async fn require_device(
    State(state): State<AppState>,
    credentials: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = credentials.is_some_and(|TypedHeader(Authorization(basic))| {
        let user_ok = basic
            .username()
            .as_bytes()
            .ct_eq(state.config.device_username.as_bytes());
        let password_ok = basic
            .password()
            .as_bytes()
            .ct_eq(state.config.device_password.as_bytes());
        (user_ok & password_ok).into()
    });

    if !authorized {
        tracing::warn!("Rejected device request with bad or missing credentials");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"lockbox devices\"")],
            "Unauthorized",
        )
            .into_response();
    }

    next.run(request).await
}
