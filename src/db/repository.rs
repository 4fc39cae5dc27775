use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::db::{
    StoreError,
    models::{Card, NewUser, OpenOutcome, User},
    queries,
};

/// User lookups and creation needed by the auth flow
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Fails with [`StoreError::Duplicate`] when the email is taken
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
}

/// Card storage needed by the ledger. Update methods return `false` when no
/// card matched.
#[async_trait]
pub trait CardRepository: Send + Sync {
    async fn create_card(&self, card_id: Uuid) -> Result<Card, StoreError>;
    async fn list_cards(&self) -> Result<Vec<Card>, StoreError>;
    async fn get_card_opens(&self, card_id: Uuid) -> Result<Option<i64>, StoreError>;
    /// Atomic read-check-decrement
    async fn consume_open(&self, card_id: Uuid) -> Result<OpenOutcome, StoreError>;
    async fn set_card_opens(&self, card_id: Uuid, opens: i64) -> Result<bool, StoreError>;
    async fn add_card_opens(&self, card_id: Uuid, delta: i64) -> Result<bool, StoreError>;
    async fn rename_card(&self, card_id: Uuid, name: &str) -> Result<bool, StoreError>;
}

/// SQLite implementation of both repositories
#[derive(Clone)]
pub struct DatabaseRepository {
    pool: Pool<Sqlite>,
}

impl DatabaseRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for DatabaseRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        queries::get_user_by_email(&self.pool, email).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        queries::insert_user(&self.pool, &new_user).await
    }
}

#[async_trait]
impl CardRepository for DatabaseRepository {
    async fn create_card(&self, card_id: Uuid) -> Result<Card, StoreError> {
        queries::insert_card(&self.pool, card_id).await
    }

    async fn list_cards(&self) -> Result<Vec<Card>, StoreError> {
        queries::list_cards(&self.pool).await
    }

    async fn get_card_opens(&self, card_id: Uuid) -> Result<Option<i64>, StoreError> {
        queries::get_card_opens(&self.pool, card_id).await
    }

    async fn consume_open(&self, card_id: Uuid) -> Result<OpenOutcome, StoreError> {
        queries::consume_card_open(&self.pool, card_id).await
    }

    async fn set_card_opens(&self, card_id: Uuid, opens: i64) -> Result<bool, StoreError> {
        queries::set_card_opens(&self.pool, card_id, opens).await
    }

    async fn add_card_opens(&self, card_id: Uuid, delta: i64) -> Result<bool, StoreError> {
        queries::add_card_opens(&self.pool, card_id, delta).await
    }

    async fn rename_card(&self, card_id: Uuid, name: &str) -> Result<bool, StoreError> {
        queries::rename_card(&self.pool, card_id, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, models::PLACEHOLDER_CARD_NAME};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[tokio::test]
    async fn test_user_round_trip() {
        let repo = DatabaseRepository::new(memory_pool().await);

        let created = repo.create_user(new_user("ada@example.com")).await.unwrap();
        let found = repo.find_user_by_email("ada@example.com").await.unwrap().unwrap();

        assert_eq!(found.user_id, created.user_id);
        assert_eq!(found.password_hash, "$argon2id$stub");
        assert_eq!(found.first_name, "Ada");
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_sensitive() {
        let repo = DatabaseRepository::new(memory_pool().await);
        repo.create_user(new_user("ada@example.com")).await.unwrap();

        assert!(repo.find_user_by_email("ADA@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_reported() {
        let repo = DatabaseRepository::new(memory_pool().await);
        repo.create_user(new_user("ada@example.com")).await.unwrap();

        let err = repo.create_user(new_user("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
    }

    #[tokio::test]
    async fn test_create_card_defaults() {
        let repo = DatabaseRepository::new(memory_pool().await);
        let id = Uuid::new_v4();

        let card = repo.create_card(id).await.unwrap();
        assert_eq!(card.friendly_name, PLACEHOLDER_CARD_NAME);
        assert_eq!(card.remaining_opens, 0);
        assert_eq!(repo.get_card_opens(id).await.unwrap(), Some(0));

        let err = repo.create_card(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
    }

    #[tokio::test]
    async fn test_updates_report_missing_card() {
        let repo = DatabaseRepository::new(memory_pool().await);
        let missing = Uuid::new_v4();

        assert!(!repo.set_card_opens(missing, 3).await.unwrap());
        assert!(!repo.add_card_opens(missing, 1).await.unwrap());
        assert!(!repo.rename_card(missing, "Front door").await.unwrap());
        assert_eq!(repo.get_card_opens(missing).await.unwrap(), None);
        assert_eq!(repo.consume_open(missing).await.unwrap(), OpenOutcome::NotFound);
    }
}
