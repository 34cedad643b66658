use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::notify::Site;
use crate::retry::RetryPolicy;

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long")]
    WeakSecret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Send while handling the request.
    Sync,
    /// Hand off to the background retry runner.
    Queued,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Plain connections are only used for port 25 relays.
    pub starttls: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub site: Site,
    pub email_from: String,
    pub smtp: Option<SmtpConfig>,
    pub notify_mode: NotifyMode,
    pub retry: RetryPolicy,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { var: name, value: raw }),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let notify_mode = match var("NOTIFY_MODE").as_deref() {
            None | Some("queued") => NotifyMode::Queued,
            Some("sync") => NotifyMode::Sync,
            Some(other) => {
                return Err(ConfigError::Invalid { var: "NOTIFY_MODE", value: other.to_string() })
            }
        };
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parsed("NOTIFY_MAX_ATTEMPTS", defaults.max_attempts)?.max(1),
            backoff: Duration::from_secs(parsed("NOTIFY_BACKOFF_SECS", defaults.backoff.as_secs())?),
        };

        let smtp = match var("SMTP_HOST") {
            Some(host) => {
                let port = parsed("SMTP_PORT", 587u16)?;
                Some(SmtpConfig {
                    host,
                    port,
                    username: var("SMTP_USERNAME"),
                    password: var("SMTP_PASSWORD"),
                    starttls: port != 25,
                })
            }
            None => None,
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            database_url: var("DATABASE_URL"),
            data_dir: var("FORUM_DATA_DIR").map(PathBuf::from),
            site: Site {
                name: var("SITE_NAME").unwrap_or_else(|| "Quorum".into()),
                url: var("SITE_URL").unwrap_or_else(|| "http://localhost:8080".into()),
            },
            email_from: var("EMAIL_FROM").unwrap_or_else(|| "noreply@localhost".into()),
            smtp,
            notify_mode,
            retry,
        })
    }
}
