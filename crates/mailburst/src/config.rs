//! Configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use mailburst_smtp::SessionConfig;

use crate::error::{Error, Result};
use crate::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};

/// Default number of worker tasks.
pub const DEFAULT_WORKERS: usize = 3;

/// Default initial backoff, in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;

/// Default maximum backoff, in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Everything a dispatch run needs.
#[derive(Clone)]
pub struct Config {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port (implicit TLS).
    pub port: u16,
    /// Sender address of every message.
    pub from: String,
    /// AUTH LOGIN username.
    pub username: String,
    /// AUTH LOGIN password or app token.
    pub password: String,
    /// Number of worker tasks.
    pub workers: usize,
    /// Retry policy shared by every message.
    pub retry: RetryPolicy,
}

impl Config {
    /// Loads the configuration from process environment variables.
    ///
    /// Required: `SMTP_SERVER`, `SMTP_PORT`, `MAIL_FROM`, `MAIL_PASS`.
    /// Optional: `SMTP_USER` (defaults to `MAIL_FROM`), `MAILBURST_WORKERS`,
    /// `MAILBURST_MAX_RETRIES`, `MAILBURST_INITIAL_BACKOFF_MS`,
    /// `MAILBURST_MAX_BACKOFF_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| Error::Config(format!("{key} is not set")));

        let host = required("SMTP_SERVER")?;
        let port = parse("SMTP_PORT", &required("SMTP_PORT")?)?;
        let from = required("MAIL_FROM")?;
        let password = required("MAIL_PASS")?;
        let username = get("SMTP_USER").unwrap_or_else(|| from.clone());

        let workers = optional(get("MAILBURST_WORKERS"), "MAILBURST_WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(Error::Config("MAILBURST_WORKERS must be at least 1".into()));
        }

        let max_retries = optional(
            get("MAILBURST_MAX_RETRIES"),
            "MAILBURST_MAX_RETRIES",
            DEFAULT_MAX_RETRIES,
        )?;
        let initial = optional(
            get("MAILBURST_INITIAL_BACKOFF_MS"),
            "MAILBURST_INITIAL_BACKOFF_MS",
            DEFAULT_INITIAL_BACKOFF_MS,
        )?;
        let max = optional(
            get("MAILBURST_MAX_BACKOFF_MS"),
            "MAILBURST_MAX_BACKOFF_MS",
            DEFAULT_MAX_BACKOFF_MS,
        )?;

        Ok(Self {
            host,
            port,
            from,
            username,
            password,
            workers,
            retry: RetryPolicy::new(
                max_retries,
                Duration::from_millis(initial),
                Duration::from_millis(max),
            ),
        })
    }

    /// Returns the per-session settings for this configuration.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig::builder(self.host.clone())
            .port(self.port)
            .credentials(self.username.clone(), self.password.clone())
            .build()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("workers", &self.workers)
            .field("retry", &self.retry)
            .finish()
    }
}

fn optional<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |value| parse(key, &value))
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {key} {value:?}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("SMTP_SERVER", "smtp.example.com"),
        ("SMTP_PORT", "465"),
        ("MAIL_FROM", "me@example.com"),
        ("MAIL_PASS", "app-password"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(BASE).unwrap();

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 465);
        assert_eq!(config.username, "me@example.com");
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("SMTP_USER", "login-name"),
            ("MAILBURST_WORKERS", "8"),
            ("MAILBURST_MAX_RETRIES", "0"),
            ("MAILBURST_INITIAL_BACKOFF_MS", "250"),
            ("MAILBURST_MAX_BACKOFF_MS", "5000"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.username, "login-name");
        assert_eq!(config.from, "me@example.com");
        assert_eq!(config.workers, 8);
        assert!(!config.retry.is_enabled());
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_variable_is_named() {
        let vars: Vec<_> = BASE.iter().copied().filter(|(k, _)| *k != "MAIL_PASS").collect();
        let err = load(&vars).unwrap_err();
        assert_eq!(err.to_string(), "configuration error: MAIL_PASS is not set");
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let mut vars = BASE.to_vec();
        vars[0] = ("SMTP_SERVER", "  ");
        assert!(load(&vars).unwrap_err().to_string().contains("SMTP_SERVER"));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = BASE.to_vec();
        vars[1] = ("SMTP_PORT", "smtp");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.starts_with("invalid SMTP_PORT")));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("MAILBURST_WORKERS", "0"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_session_config() {
        let session = load(BASE).unwrap().session();
        assert_eq!(session.address(), "smtp.example.com:465");
        assert_eq!(session.username, "me@example.com");
        assert_eq!(session.password, "app-password");
        assert_eq!(session.ehlo_hostname, "localhost");
    }

    #[test]
    fn test_debug_hides_password() {
        let config = load(BASE).unwrap();
        assert!(!format!("{config:?}").contains("app-password"));
    }
}
