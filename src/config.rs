use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_secs: u64,
    pub base_url: String,
    pub operator_emails: Vec<String>,
    pub session: SessionConfig,
    pub mail: MailConfig,
    pub hash: HashConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let defaults = HashConfig::default();
        let session = SessionConfig {
            ttl_minutes: session_ttl_minutes(env_parse("SESSION_TTL_MINUTES")),
            cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "session_token".into()),
            cookie_secure: env_parse("SESSION_COOKIE_SECURE").unwrap_or(false),
        };
        let mail = MailConfig {
            endpoint: std::env::var("MAIL_ENDPOINT").ok().filter(|v| !v.is_empty()),
            api_key: std::env::var("MAIL_API_KEY").ok().filter(|v| !v.is_empty()),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@forum.local".into()),
            timeout_secs: env_parse("NOTIFY_TIMEOUT_SECS").unwrap_or(10),
        };
        let hash = HashConfig {
            memory_kib: env_parse("ARGON2_MEMORY_KIB").unwrap_or(defaults.memory_kib),
            iterations: env_parse("ARGON2_ITERATIONS").unwrap_or(defaults.iterations),
            parallelism: env_parse("ARGON2_PARALLELISM").unwrap_or(defaults.parallelism),
        };
        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
            db_timeout_secs: env_parse("DB_TIMEOUT_SECS").unwrap_or(5),
            base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api/v1".into()),
            operator_emails: parse_email_list(
                &std::env::var("OPERATOR_EMAILS").unwrap_or_else(|_| "admin@forum.local".into()),
            ),
            session,
            mail,
            hash,
        })
    }
}

const DEFAULT_SESSION_TTL_MINUTES: i64 = 12 * 60;
const MAX_SESSION_TTL_MINUTES: i64 = 365 * 24 * 60;

/// Non-positive or absurd windows fall back to the default.
fn session_ttl_minutes(raw: Option<i64>) -> i64 {
    match raw {
        Some(m) if (1..=MAX_SESSION_TTL_MINUTES).contains(&m) => m,
        Some(m) => {
            warn!(minutes = m, "SESSION_TTL_MINUTES out of range; using default");
            DEFAULT_SESSION_TTL_MINUTES
        }
        None => DEFAULT_SESSION_TTL_MINUTES,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

pub(crate) fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
