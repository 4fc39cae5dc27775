use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use async_trait::async_trait;

/// Hash/verify capability used at registration and login
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<String>;
    /// `Ok(false)` for a wrong password; `Err` only for unusable hashes
    async fn verify(&self, hash: &str, plaintext: &str) -> Result<bool>;
}

/// Argon2id with a random salt per hash. The work runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

fn hash_blocking(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

fn verify_blocking(hash: &str, plaintext: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash: {}", e))?;
    match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, plaintext: &str) -> Result<String> {
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hash_blocking(&plaintext))
            .await
            .context("Password hashing task failed")?
    }

    async fn verify(&self, hash: &str, plaintext: &str) -> Result<bool> {
        let hash = hash.to_string();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || verify_blocking(&hash, &plaintext))
            .await
            .context("Password verification task failed")?
    }
}
