use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::db::{
    StoreError,
    models::{Card, NewUser, OpenOutcome, PLACEHOLDER_CARD_NAME, UNLIMITED_OPENS, User},
};

fn unique_violation(err: sqlx::Error) -> StoreError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Database(err),
    }
}

pub async fn get_user_by_email(pool: &Pool<Sqlite>, email: &str) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT user_id, created_at, email, password_hash, first_name, last_name
         FROM users WHERE email = ?"
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    
    Ok(user)
}

pub async fn insert_user(pool: &Pool<Sqlite>, new_user: &NewUser) -> Result<User, StoreError> {
    let user = User {
        user_id: Uuid::new_v4(),
        created_at: Utc::now(),
        email: new_user.email.clone(),
        password_hash: new_user.password_hash.clone(),
        first_name: new_user.first_name.clone(),
        last_name: new_user.last_name.clone(),
    };
    
    sqlx::query(
        "INSERT INTO users (user_id, created_at, email, password_hash, first_name, last_name)
         VALUES (?, ?, ?, ?, ?, ?)"
    )
    .bind(user.user_id)
    .bind(user.created_at)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .execute(pool)
    .await
    .map_err(unique_violation)?;
    
    Ok(user)
}

pub async fn insert_card(pool: &Pool<Sqlite>, card_id: Uuid) -> Result<Card, StoreError> {
    let card = Card {
        card_id,
        created_at: Utc::now(),
        friendly_name: PLACEHOLDER_CARD_NAME.to_string(),
        remaining_opens: 0,
    };
    
    sqlx::query(
        "INSERT INTO cards (card_id, created_at, friendly_name, remaining_opens)
         VALUES (?, ?, ?, ?)"
    )
    .bind(card.card_id)
    .bind(card.created_at)
    .bind(&card.friendly_name)
    .bind(card.remaining_opens)
    .execute(pool)
    .await
    .map_err(unique_violation)?;
    
    Ok(card)
}

pub async fn list_cards(pool: &Pool<Sqlite>) -> Result<Vec<Card>, StoreError> {
    let cards = sqlx::query_as::<_, Card>(
        "SELECT card_id, created_at, friendly_name, remaining_opens
         FROM cards ORDER BY created_at DESC, rowid DESC"
    )
    .fetch_all(pool)
    .await?;
    
    Ok(cards)
}

pub async fn get_card_opens(pool: &Pool<Sqlite>, card_id: Uuid) -> Result<Option<i64>, StoreError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT remaining_opens FROM cards WHERE card_id = ?"
    )
    .bind(card_id)
    .fetch_optional(pool)
    .await?;
    
    Ok(row.map(|(opens,)| opens))
}

/// Spend one open in a single transaction.
///
/// The conditional UPDATE is the compare-and-swap: two concurrent callers
/// against a counter of 1 cannot both see a row come back. The follow-up read
/// only classifies why nothing was updated and runs under the same
/// transaction's write lock.
pub async fn consume_card_open(pool: &Pool<Sqlite>, card_id: Uuid) -> Result<OpenOutcome, StoreError> {
    let mut tx = pool.begin().await?;
    
    let updated: Option<(i64,)> = sqlx::query_as(
        "UPDATE cards SET remaining_opens = remaining_opens - 1
         WHERE card_id = ? AND remaining_opens > 0
         RETURNING remaining_opens"
    )
    .bind(card_id)
    .fetch_optional(&mut *tx)
    .await?;
    
    let outcome = match updated {
        Some((remaining,)) => OpenOutcome::Consumed { remaining },
        None => {
            let current: Option<(i64,)> = sqlx::query_as(
                "SELECT remaining_opens FROM cards WHERE card_id = ?"
            )
            .bind(card_id)
            .fetch_optional(&mut *tx)
            .await?;
            
            match current {
                None => OpenOutcome::NotFound,
                Some((UNLIMITED_OPENS,)) => OpenOutcome::Unlimited,
                Some((remaining,)) => OpenOutcome::Exhausted { remaining },
            }
        }
    };
    
    tx.commit().await?;
    
    Ok(outcome)
}

pub async fn set_card_opens(pool: &Pool<Sqlite>, card_id: Uuid, opens: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE cards SET remaining_opens = ? WHERE card_id = ?"
    )
    .bind(opens)
    .bind(card_id)
    .execute(pool)
    .await?;
    
    Ok(result.rows_affected() > 0)
}

pub async fn add_card_opens(pool: &Pool<Sqlite>, card_id: Uuid, delta: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE cards SET remaining_opens = remaining_opens + ? WHERE card_id = ?"
    )
    .bind(delta)
    .bind(card_id)
    .execute(pool)
    .await?;
    
    Ok(result.rows_affected() > 0)
}

pub async fn rename_card(pool: &Pool<Sqlite>, card_id: Uuid, name: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE cards SET friendly_name = ? WHERE card_id = ?"
    )
    .bind(name)
    .bind(card_id)
    .execute(pool)
    .await?;
    
    Ok(result.rows_affected() > 0)
}
