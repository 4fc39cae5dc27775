use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{
    CardRepository, StoreError,
    models::{Card, OpenOutcome, UNLIMITED_OPENS},
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("card already exists")]
    DuplicateCard,
    #[error("card not found")]
    CardNotFound,
    #[error("card has no remaining opens")]
    NoRemainingOpens,
    #[error("remaining opens must be -1 or greater, got {0}")]
    InvalidOpens(i64),
    #[error("card name must not be empty")]
    EmptyName,
    #[error("card store failed")]
    Store(#[source] StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => Self::DuplicateCard,
            other => Self::Store(other),
        }
    }
}

/// Open-counter operations on cards.
///
/// Counter semantics: `-1` unlimited, `0` disabled, `N > 0` uses left.
/// Only [`CardLedger::use_card`] has concurrency requirements, and those are
/// met by the repository's single-transaction `consume_open`.
#[derive(Clone)]
pub struct CardLedger {
    cards: Arc<dyn CardRepository>,
}

impl CardLedger {
    pub fn new(cards: Arc<dyn CardRepository>) -> Self {
        Self { cards }
    }

    /// Register a new card, disabled and with the placeholder name
    pub async fn provision(&self, card_id: Uuid) -> Result<Card, LedgerError> {
        let card = self.cards.create_card(card_id).await?;
        tracing::info!(%card_id, "Provisioned card");
        Ok(card)
    }

    /// Spend one open. Unlimited cards succeed without touching the counter.
    pub async fn use_card(&self, card_id: Uuid) -> Result<(), LedgerError> {
        match self.cards.consume_open(card_id).await? {
            OpenOutcome::Consumed { remaining } => {
                tracing::debug!(%card_id, remaining, "Card used");
                Ok(())
            }
            OpenOutcome::Unlimited => {
                tracing::debug!(%card_id, "Unlimited card used");
                Ok(())
            }
            OpenOutcome::Exhausted { remaining } => {
                tracing::debug!(%card_id, remaining, "Card has no remaining opens");
                Err(LedgerError::NoRemainingOpens)
            }
            OpenOutcome::NotFound => Err(LedgerError::CardNotFound),
        }
    }

    #[cfg(test)]
    pub async fn remaining_opens(&self, card_id: Uuid) -> Result<i64, LedgerError> {
        self.cards
            .get_card_opens(card_id)
            .await?
            .ok_or(LedgerError::CardNotFound)
    }

    /// Absolute set; anything below the unlimited sentinel is rejected
    pub async fn set_opens(&self, card_id: Uuid, opens: i64) -> Result<(), LedgerError> {
        if opens < UNLIMITED_OPENS {
            return Err(LedgerError::InvalidOpens(opens));
        }

        if !self.cards.set_card_opens(card_id, opens).await? {
            return Err(LedgerError::CardNotFound);
        }

        tracing::info!(%card_id, opens, "Set card opens");
        Ok(())
    }

    /// Relative adjustment for admin increment/decrement. Deliberately unclamped.
    pub async fn adjust_opens(&self, card_id: Uuid, delta: i64) -> Result<(), LedgerError> {
        if !self.cards.add_card_opens(card_id, delta).await? {
            return Err(LedgerError::CardNotFound);
        }

        tracing::info!(%card_id, delta, "Adjusted card opens");
        Ok(())
    }

    pub async fn rename(&self, card_id: Uuid, name: &str) -> Result<(), LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::EmptyName);
        }

        if !self.cards.rename_card(card_id, name).await? {
            return Err(LedgerError::CardNotFound);
        }

        Ok(())
    }

    /// All cards, newest first
    pub async fn list(&self) -> Result<Vec<Card>, LedgerError> {
        Ok(self.cards.list_cards().await?)
    }
}
