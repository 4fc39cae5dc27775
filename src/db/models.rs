use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Friendly name given to freshly provisioned cards
pub const PLACEHOLDER_CARD_NAME: &str = "New Card";

/// `remaining_opens` sentinel for cards with no limit
pub const UNLIMITED_OPENS: i64 = -1;

#[derive(Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Card {
    pub card_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub friendly_name: String,
    pub remaining_opens: i64,
}

impl Card {
    pub fn is_unlimited(&self) -> bool {
        self.remaining_opens == UNLIMITED_OPENS
    }
}

/// What happened when a device tried to spend one open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A finite counter was decremented, leaving `remaining`
    Consumed { remaining: i64 },
    /// Unlimited card, counter untouched
    Unlimited,
    /// Counter was 0 (or otherwise unusable) and was left as is
    Exhausted { remaining: i64 },
    NotFound,
}
