//! Fixtures shared by the unit tests.

use async_trait::async_trait;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    app_state::AppState,
    auth::{
        AuthService, ConfirmationMail,
        password::{Argon2Hasher, PasswordHasher},
        rate_limit::MemoryRateLimiter,
    },
    config::Config,
    db::{
        DatabaseRepository, StoreError, UserRepository, memory_pool,
        models::{NewUser, User},
    },
    ledger::CardLedger,
    mail::{Mailer, OutgoingMail},
    token::TokenCodec,
    views::Views,
};

/// Keeps every message instead of delivering it
#[derive(Default)]
pub struct RecordingMailer {
    outbox: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.outbox.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        self.outbox.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Counts user lookups so tests can assert the store was not touched
pub struct CountingUsers {
    inner: DatabaseRepository,
    pub lookups: AtomicUsize,
}

impl CountingUsers {
    pub fn new(inner: DatabaseRepository) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UserRepository for CountingUsers {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_user_by_email(email).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.inner.create_user(new_user).await
    }
}

/// Argon2 hasher that counts how often each operation runs
#[derive(Default)]
pub struct CountingHasher {
    pub hashes: AtomicUsize,
    pub verifies: AtomicUsize,
}

#[async_trait]
impl PasswordHasher for CountingHasher {
    async fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
        self.hashes.fetch_add(1, Ordering::SeqCst);
        Argon2Hasher.hash(plaintext).await
    }

    async fn verify(&self, hash: &str, plaintext: &str) -> anyhow::Result<bool> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        Argon2Hasher.verify(hash, plaintext).await
    }
}

pub const TEST_SECRET: &str = "router-test-secret";
pub const DEVICE_USER: &str = "esp32";
pub const DEVICE_PASSWORD: &str = "door-sesame";

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: "http://lockbox.test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        device_username: DEVICE_USER.to_string(),
        device_password: DEVICE_PASSWORD.to_string(),
        smtp_host: None,
        smtp_username: None,
        smtp_password: None,
        mail_from: "No Reply <noreply@lockbox.test>".to_string(),
        secure_cookies: false,
        request_timeout_secs: 30,
        signup_window_secs: 900,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub repo: DatabaseRepository,
    pub mailer: Arc<RecordingMailer>,
}

/// Full application state over a fresh in-memory database
pub async fn test_app() -> TestApp {
    let config = Arc::new(test_config());
    let repo = DatabaseRepository::new(memory_pool().await);
    let mailer = Arc::new(RecordingMailer::default());
    let views = Arc::new(Views::new("Lockbox"));

    let auth = AuthService::new(
        Arc::new(repo.clone()),
        TokenCodec::new(config.jwt_secret.as_bytes()),
        Arc::new(Argon2Hasher),
        Arc::new(MemoryRateLimiter::new(1, config.signup_window())),
        mailer.clone(),
        views.clone(),
        ConfirmationMail {
            public_url: config.public_url.clone(),
            from: config.mail_from.clone(),
        },
    );

    let state = AppState {
        config,
        users: Arc::new(repo.clone()),
        auth: Arc::new(auth),
        ledger: Arc::new(CardLedger::new(Arc::new(repo.clone()))),
        views,
    };

    TestApp {
        state,
        repo,
        mailer,
    }
}
