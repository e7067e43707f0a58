//! Configuration types, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Core configuration for the coaching engine.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    /// Path to the local libSQL database file.
    pub db_path: String,
    /// Dev mode bypasses premium gating on therapist search.
    pub dev_mode: bool,
    /// Base URL of the therapist-search service. `None` disables search.
    pub search_base_url: Option<String>,
    /// Timeout for one search request.
    pub search_timeout: Duration,
    /// Timeout for one text-generation call.
    pub generation_timeout: Duration,
    /// Chat requests allowed per client per window.
    pub rate_limit_chat_requests: usize,
    /// Rolling rate-limit window.
    pub rate_limit_window: Duration,
    /// Conversation turns kept per session (user + assistant pairs).
    pub conversation_history_max_turns: usize,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/mh-coach.db".to_string(),
            dev_mode: false,
            search_base_url: None,
            search_timeout: Duration::from_secs(5),
            generation_timeout: Duration::from_secs(180),
            rate_limit_chat_requests: 10,
            rate_limit_window: Duration::from_secs(60),
            conversation_history_max_turns: 10,
        }
    }
}

impl CoachConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("COACH_DB_PATH").unwrap_or(defaults.db_path),
            dev_mode: std::env::var("COACH_DEV_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            search_base_url: std::env::var("COACH_SEARCH_URL").ok().filter(|s| !s.is_empty()),
            search_timeout: Duration::from_secs(env_parse("COACH_SEARCH_TIMEOUT_SECS", 5)),
            generation_timeout: Duration::from_secs(env_parse("COACH_GENERATION_TIMEOUT_SECS", 180)),
            rate_limit_chat_requests: env_parse("COACH_RATE_LIMIT_REQUESTS", 10),
            rate_limit_window: Duration::from_secs(env_parse("COACH_RATE_LIMIT_WINDOW_SECS", 60)),
            conversation_history_max_turns: env_parse("COACH_HISTORY_MAX_TURNS", 10),
        }
    }
}

/// SMTP configuration for outbound booking emails.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `COACH_SMTP_HOST` is not set (email sending disabled).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("COACH_SMTP_HOST").ok()?;

        let smtp_port: u16 = std::env::var("COACH_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("COACH_SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("COACH_SMTP_PASSWORD").unwrap_or_default());
        let from_address =
            std::env::var("COACH_SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}
