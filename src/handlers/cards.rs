use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{app_state::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct CardRequest {
    uuid: Uuid,
}

fn card_id(body: Result<Json<CardRequest>, JsonRejection>) -> Result<Uuid, AppError> {
    body.map(|Json(req)| req.uuid)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

/// POST /api/cards/new
/// Provisions a card under the id the device supplies
#[tracing::instrument(skip_all)]
pub async fn create_card(
    State(state): State<AppState>,
    body: Result<Json<CardRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let card_id = card_id(body)?;
    state.ledger.provision(card_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/cards/use
/// Spends one open; 400 when the card is unknown or has none left
#[tracing::instrument(skip_all)]
pub async fn use_card(
    State(state): State<AppState>,
    body: Result<Json<CardRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let card_id = card_id(body)?;
    state.ledger.use_card(card_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
