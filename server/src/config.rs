use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the API server listens on
    pub port: u16,
    /// Path to the SQLite database
    pub database_url: String,
    /// Base URL of the retrieval collaborator's streaming answer API
    pub retrieval_base_url: String,
    /// Allowed CORS origins for the web UI
    pub cors_origins: Vec<String>,
    /// Key used to sign preview URLs
    pub url_signing_key: String,
    /// Validity window for issued preview URLs
    pub preview_url_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: env_parse("DOCENT_PORT", 8080)?,
            database_url: env_str("DOCENT_DATABASE_URL", "sqlite:./data/docent.db"),
            retrieval_base_url: env_str("DOCENT_RETRIEVAL_BASE_URL", "http://127.0.0.1:8000"),
            cors_origins: env_csv(
                "DOCENT_CORS_ORIGINS",
                &["http://localhost:3000", "http://127.0.0.1:3000"],
            ),
            url_signing_key: env_str("DOCENT_URL_SIGNING_KEY", "dev-only-signing-key"),
            preview_url_ttl: Duration::from_secs(env_parse("DOCENT_PREVIEW_URL_TTL_SECS", 3600)?),
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}
