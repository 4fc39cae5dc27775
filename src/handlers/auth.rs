use axum::{
    Form,
    extract::{ConnectInfo, Path, State, rejection::FormRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::net::SocketAddr;

use crate::{
    app_state::AppState,
    auth::{AuthError, RegistrationRequest},
    error::AppError,
    handlers::session::{clear_session, set_session},
};

const LOGIN_FAILED: &str = "Invalid email and/or password";
const FIELDS_EMPTY: &str = "One or more fields are empty";
const EMAIL_TAKEN: &str = "Email already in use";
const TOO_MANY_SIGNUPS: &str = "Too many sign-up attempts, please try again later";
const BAD_REGISTRATION: &str = "Invalid registration details. Please try again later";

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    remember_me: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateAccountForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

impl From<CreateAccountForm> for RegistrationRequest {
    fn from(form: CreateAccountForm) -> Self {
        Self {
            email: form.email.trim().to_string(),
            password: form.password,
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
        }
    }
}

fn page(status: StatusCode, html: Html<String>) -> Response {
    (status, html).into_response()
}

pub async fn login_page(State(state): State<AppState>) -> Html<String> {
    state.views.login(None)
}

/// POST /app/login
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(form) = form.map_err(|rejection| AppError::validation(rejection.body_text()))?;

    let email = form.email.trim();
    if !email.contains('@') || form.password.is_empty() {
        return Ok(page(
            StatusCode::BAD_REQUEST,
            state.views.login(Some("Enter your email address and password")),
        ));
    }

    let remember_me = form.remember_me.as_deref() == Some("on");
    match state.auth.login(email, &form.password, remember_me).await {
        Ok(tokens) => {
            let jar = set_session(jar, &tokens, state.config.secure_cookies)?;
            Ok((jar, Redirect::to("/app/dashboard")).into_response())
        }
        Err(AuthError::UserNotFound | AuthError::BadPassword) => Ok(page(
            StatusCode::UNAUTHORIZED,
            state.views.login(Some(LOGIN_FAILED)),
        )),
        Err(err) => Err(err.into()),
    }
}

/// GET /app/logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    let jar = clear_session(jar, state.config.secure_cookies)?;
    Ok((jar, Redirect::to("/app/login")).into_response())
}

pub async fn create_account_page(State(state): State<AppState>) -> Html<String> {
    state.views.create_account(None)
}

/// POST /app/createaccount
/// Emails a confirmation link; the account only exists once it is followed.
#[tracing::instrument(skip_all, fields(client = %client))]
pub async fn create_account(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    form: Result<Form<CreateAccountForm>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(form) = form.map_err(|rejection| AppError::validation(rejection.body_text()))?;
    let client = client.ip().to_string();

    let result = state
        .auth
        .begin_registration(&client, RegistrationRequest::from(form))
        .await;

    let views = &state.views;
    Ok(match result {
        Ok(()) => page(StatusCode::OK, views.check_email()),
        Err(AuthError::IncompleteRegistration) => page(
            StatusCode::UNAUTHORIZED,
            views.create_account(Some(FIELDS_EMPTY)),
        ),
        Err(AuthError::DuplicateEmail) => page(
            StatusCode::UNAUTHORIZED,
            views.create_account(Some(EMAIL_TAKEN)),
        ),
        Err(AuthError::RateLimited) => page(
            StatusCode::TOO_MANY_REQUESTS,
            views.create_account(Some(TOO_MANY_SIGNUPS)),
        ),
        Err(err) => return Err(err.into()),
    })
}

/// GET /app/confirmemail/{token}
#[tracing::instrument(skip_all)]
pub async fn confirm_email(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let views = &state.views;
    match state.auth.confirm_registration(&token).await {
        Ok(tokens) => {
            let jar = set_session(jar, &tokens, state.config.secure_cookies)?;
            Ok((jar, Redirect::to("/app/dashboard")).into_response())
        }
        Err(AuthError::InvalidRegistrationToken) => Ok(page(
            StatusCode::UNAUTHORIZED,
            views.create_account(Some(BAD_REGISTRATION)),
        )),
        Err(AuthError::DuplicateEmail) => Ok(page(
            StatusCode::BAD_REQUEST,
            views.create_account(Some(EMAIL_TAKEN)),
        )),
        Err(err) => Err(err.into()),
    }
}
