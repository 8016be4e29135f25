use std::env;

use chrono::Duration;

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const LOCAL_CONFIRMATION_SECRET: &str = "local-confirmation-code-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_MAIL_FROM: &str = "noreply@title-reviews.local";

/// Upper bound for `ACCESS_TOKEN_TTL_MINUTES` (30 days).
pub const MAX_ACCESS_TOKEN_TTL_MINUTES: i64 = 30 * 24 * 60;
/// Upper bound for `CONFIRMATION_CODE_TTL_HOURS` (7 days).
pub const MAX_CONFIRMATION_CODE_TTL_HOURS: i64 = 7 * 24;

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and
/// pulled into handlers through `FromRef`, like every other part of `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and which secrets are mandatory.
    pub env: Env,
    // Postgres connection string. `None` (local only) selects the in-memory store.
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // HS256 key used to sign and verify access tokens.
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    // HMAC key for confirmation codes. Kept separate from the JWT key.
    pub confirmation_secret: String,
    pub confirmation_code_ttl_hours: i64,
    // Outbound mail. `None` means codes are written to the log instead of sent.
    pub smtp: Option<SmtpConfig>,
    pub mail_from: String,
    // Default page size for every list endpoint.
    pub page_size: u32,
}

/// SmtpConfig
///
/// Connection settings for the SMTP relay used to deliver confirmation codes.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Env
///
/// The runtime context: local development (pretty logs, dev fallbacks for secrets,
/// optional database) or production (JSON logs, every secret mandatory).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests: in-memory store, log mailer,
    /// fixed secrets.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            db_max_connections: 5,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            access_token_ttl_minutes: 24 * 60,
            confirmation_secret: LOCAL_CONFIRMATION_SECRET.to_string(),
            confirmation_code_ttl_hours: 24,
            smtp: None,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            page_size: 10,
        }
    }
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} must be a valid number, got {raw:?}")),
        Err(_) => default,
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables, failing fast.
    ///
    /// # Panics
    /// Panics if a variable required by the current environment is missing (in
    /// production: `DATABASE_URL`, `JWT_SECRET`, `CONFIRMATION_CODE_SECRET`,
    /// `SMTP_HOST`) or if a numeric variable does not parse.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let smtp = env::var("SMTP_HOST").ok().map(|host| SmtpConfig {
            host,
            port: parsed_or("SMTP_PORT", DEFAULT_SMTP_PORT),
            user: env::var("SMTP_USER").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
        });

        let (db_url, jwt_secret, confirmation_secret) = match env {
            Env::Production => {
                assert!(
                    smtp.is_some(),
                    "FATAL: SMTP_HOST required in prod (confirmation codes must be delivered)"
                );
                (
                    Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")),
                    env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
                    env::var("CONFIRMATION_CODE_SECRET")
                        .expect("FATAL: CONFIRMATION_CODE_SECRET must be set in production."),
                )
            }
            Env::Local => (
                env::var("DATABASE_URL").ok(),
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                env::var("CONFIRMATION_CODE_SECRET")
                    .unwrap_or_else(|_| LOCAL_CONFIRMATION_SECRET.to_string()),
            ),
        };

        Self {
            env,
            db_url,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 5),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret,
            access_token_ttl_minutes: parsed_or::<i64>("ACCESS_TOKEN_TTL_MINUTES", 24 * 60)
                .clamp(1, MAX_ACCESS_TOKEN_TTL_MINUTES),
            confirmation_secret,
            confirmation_code_ttl_hours: parsed_or::<i64>("CONFIRMATION_CODE_TTL_HOURS", 24)
                .clamp(1, MAX_CONFIRMATION_CODE_TTL_HOURS),
            smtp,
            mail_from: env::var("SMTP_FROM").unwrap_or_else(|_| DEFAULT_MAIL_FROM.to_string()),
            page_size: parsed_or::<u32>("PAGE_SIZE", 10).clamp(1, crate::models::MAX_PAGE_SIZE),
        }
    }

    /// Access token lifetime, kept within bounds even for a hand-built config.
    pub fn access_token_ttl(&self) -> Duration {
        Duration::minutes(self.access_token_ttl_minutes.clamp(1, MAX_ACCESS_TOKEN_TTL_MINUTES))
    }

    pub fn confirmation_code_ttl(&self) -> Duration {
        Duration::hours(
            self.confirmation_code_ttl_hours
                .clamp(1, MAX_CONFIRMATION_CODE_TTL_HOURS),
        )
    }
}
