use std::fmt;

use anyhow::{bail, Context};

/// Minimum length of the HMAC signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Values that show up in tutorials and sample `.env` files.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "your-secret-key",
    "secret",
    "changeme",
    "change-me",
    "jwt-secret",
    "supersecret",
    "dev-secret",
    "test",
];

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let secret = std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        validate_secret(&secret)?;

        let jwt = JwtConfig {
            secret,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authd".into()),
        };

        let port = match std::env::var("APP_PORT").or_else(|_| std::env::var("PORT")) {
            Ok(v) => v
                .parse::<u16>()
                .with_context(|| format!("invalid listen port {v:?}"))?,
            Err(_) => 5000,
        };

        Ok(Self {
            database_url,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            jwt,
        })
    }
}

/// Rejects signing secrets that are too short or publicly known.
pub fn validate_secret(secret: &str) -> anyhow::Result<()> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        bail!("JWT_SECRET is empty");
    }
    let lowered = trimmed.to_lowercase();
    if PLACEHOLDER_SECRETS.contains(&lowered.as_str()) {
        bail!("JWT_SECRET is a well-known placeholder value");
    }
    if trimmed.len() < MIN_SECRET_LEN {
        bail!(
            "JWT_SECRET is {} bytes, at least {} are required",
            trimmed.len(),
            MIN_SECRET_LEN
        );
    }
    let first = trimmed.chars().next();
    if trimmed.chars().all(|c| Some(c) == first) {
        bail!("JWT_SECRET is a single repeated character");
    }
    Ok(())
}
