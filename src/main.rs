mod app_state;
mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod ledger;
mod mail;
mod routes;
#[cfg(test)]
mod testing;
mod token;
mod views;

use clap::Parser;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use auth::{
    AuthService, ConfirmationMail, password::Argon2Hasher, rate_limit::MemoryRateLimiter,
};
use config::Config;
use db::{DatabaseRepository, init_pool};
use ledger::CardLedger;
use mail::{LogMailer, Mailer, SmtpMailer};
use token::TokenCodec;
use views::Views;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockbox_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration
    let config = Arc::new(Config::parse());
    tracing::debug!(?config, "Loaded configuration");

    // Initialize database
    let pool = init_pool(&config.database_url).await?;
    let repo = DatabaseRepository::new(pool);

    let mailer: Arc<dyn Mailer> = match &config.smtp_host {
        Some(host) => Arc::new(SmtpMailer::new(
            host,
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        )?),
        None => {
            tracing::warn!("SMTP_HOST not set, confirmation emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let views = Arc::new(Views::new("Lockbox"));
    let auth = AuthService::new(
        Arc::new(repo.clone()),
        TokenCodec::new(config.jwt_secret.as_bytes()),
        Arc::new(Argon2Hasher),
        Arc::new(MemoryRateLimiter::new(1, config.signup_window())),
        mailer,
        views.clone(),
        ConfirmationMail {
            public_url: config.public_url.clone(),
            from: config.mail_from.clone(),
        },
    );

    // Create shared state
    let state = AppState {
        config: config.clone(),
        users: Arc::new(repo.clone()),
        auth: Arc::new(auth),
        ledger: Arc::new(CardLedger::new(Arc::new(repo))),
        views,
    };

    let app = routes::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.socket_addr()).await?;

    tracing::info!("Server running on {}", config.socket_addr());
    tracing::info!("Public URL: {}", config.public_url);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
