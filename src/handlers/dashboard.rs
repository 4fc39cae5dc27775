use axum::{
    Extension, Form,
    extract::{Path, State, rejection::FormRejection},
    response::{Html, Redirect},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{app_state::AppState, error::AppError, handlers::session::Session};

const DASHBOARD: &str = "/app/dashboard";

#[derive(Deserialize)]
pub struct SetOpensForm {
    num: String,
}

#[derive(Deserialize)]
pub struct RenameForm {
    name: String,
}

fn parse_card_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation("invalid card id"))
}

fn form_body<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    form.map(|Form(body)| body)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

/// GET /app/dashboard
#[tracing::instrument(skip_all, fields(email = %session.email))]
pub async fn show(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    // A verified token for a user that is gone means the store and signing key disagree
    let user = state
        .users
        .find_user_by_email(&session.email)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::internal(anyhow::anyhow!("no user for a verified session")))?;

    let cards = state.ledger.list().await?;
    Ok(state.views.dashboard(&user, &cards))
}

/// POST /app/dashboard/incrementopens/{card_id}
#[tracing::instrument(skip(state))]
pub async fn increment_opens(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<Redirect, AppError> {
    state.ledger.adjust_opens(parse_card_id(&card_id)?, 1).await?;
    Ok(Redirect::to(DASHBOARD))
}

/// POST /app/dashboard/decrementopens/{card_id}
#[tracing::instrument(skip(state))]
pub async fn decrement_opens(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<Redirect, AppError> {
    state.ledger.adjust_opens(parse_card_id(&card_id)?, -1).await?;
    Ok(Redirect::to(DASHBOARD))
}

/// POST /app/dashboard/setopens/{card_id}
#[tracing::instrument(skip(state, form))]
pub async fn set_opens(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    form: Result<Form<SetOpensForm>, FormRejection>,
) -> Result<Redirect, AppError> {
    let card_id = parse_card_id(&card_id)?;
    let opens: i64 = form_body(form)?
        .num
        .trim()
        .parse()
        .map_err(|_| AppError::validation("num must be an integer"))?;

    state.ledger.set_opens(card_id, opens).await?;
    Ok(Redirect::to(DASHBOARD))
}

/// POST /app/dashboard/updatefriendlyname/{card_id}
#[tracing::instrument(skip(state, form))]
pub async fn update_friendly_name(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    form: Result<Form<RenameForm>, FormRejection>,
) -> Result<Redirect, AppError> {
    let card_id = parse_card_id(&card_id)?;
    let name = form_body(form)?.name;

    state.ledger.rename(card_id, &name).await?;
    Ok(Redirect::to(DASHBOARD))
}
