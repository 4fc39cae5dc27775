use clap::Parser;
use std::time::Duration;

#[derive(Parser, Clone)]
#[command(name = "lockbox-server")]
#[command(about = "Card access server with an authenticated dashboard and device API")]
#[command(version)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,
    
    /// Public base URL used in confirmation links (e.g., "https://lockbox.example.com")
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8000")]
    pub public_url: String,
    
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://lockbox.db")]
    pub database_url: String,
    
    /// HMAC key for signing session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
    
    /// Basic auth username for the device API
    #[arg(long, env = "DEVICE_USERNAME")]
    pub device_username: String,
    
    /// Basic auth password for the device API
    #[arg(long, env = "DEVICE_PASSWORD", hide_env_values = true)]
    pub device_password: String,
    
    /// SMTP relay for confirmation emails; emails are only logged when unset
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,
    
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,
    
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,
    
    /// Sender mailbox for confirmation emails
    #[arg(long, env = "MAIL_FROM", default_value = "No Reply <noreply@localhost>")]
    pub mail_from: String,
    
    /// Mark session cookies Secure (serve over HTTPS)
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false)]
    pub secure_cookies: bool,
    
    /// Per-request deadline in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,
    
    /// One registration per client address per this many seconds
    #[arg(long, env = "SIGNUP_WINDOW_SECS", default_value = "900")]
    pub signup_window_secs: u64,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
    
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
    
    pub fn signup_window(&self) -> Duration {
        Duration::from_secs(self.signup_window_secs)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("database_url", &self.database_url)
            .field("device_username", &self.device_username)
            .field("smtp_host", &self.smtp_host)
            .field("mail_from", &self.mail_from)
            .field("secure_cookies", &self.secure_cookies)
            .finish_non_exhaustive()
    }
}
