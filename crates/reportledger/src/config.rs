//! Runtime configuration.
//!
//! Everything comes from the process environment (optionally seeded from a
//! `.env` file) and is gathered into one explicit [`AppConfig`] that is
//! handed down to the commands. Nothing is kept in global state.

use std::env;
use std::path::PathBuf;

use reportledger_core::store::CONNECTION_ENV_VAR;
use reportledger_core::{ConnectionSettings, LookBack};
use thiserror::Error;

/// Environment variable holding the tracing filter.
pub const LOG_FILTER_ENV_VAR: &str = "REPORTLEDGER_LOG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The store connection string is malformed.
    #[error("invalid REPORTLOGS_CONN: {0}")]
    Connection(#[from] reportledger_core::Error),

    /// A numeric setting could not be parsed.
    #[error("invalid value '{value}' for {key}")]
    InvalidNumber {
        /// Environment variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },

    /// An unknown SMTP security mode was given.
    #[error("invalid SMTP security mode '{0}' (expected tls, starttls or none)")]
    InvalidSecurity(String),
}

/// Security/encryption mode for the SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (local relays only).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            "none" | "plain" => Ok(Self::None),
            other => Err(ConfigError::InvalidSecurity(other.to_string())),
        }
    }

    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Tls => 465,
            Self::StartTls => 587,
            Self::None => 25,
        }
    }
}

/// SMTP server configuration.
#[derive(Clone)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Sender address, also used as the login name.
    pub from: String,
    /// App password for authentication.
    pub password: String,
}

impl SmtpConfig {
    /// Whether a sender address and password are both present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.from.trim().is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("from", &self.from)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Top-level configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Audit store connection.
    pub store: ConnectionSettings,
    /// Mail transport.
    pub smtp: SmtpConfig,
    /// Master workbook recorded on events.
    pub master_path: String,
    /// Directory for the runner log and per-run exports.
    pub log_dir: PathBuf,
    /// Tracing filter directive.
    pub log_filter: String,
    /// Candidates processed at once.
    pub max_parallel: usize,
    /// Freshness/duplicate window.
    pub window: LookBack,
    /// Require refreshes delivered by email.
    pub require_method_email: bool,
    /// Record eligible candidates without sending.
    pub dry_run: bool,
    /// Minutes east of UTC used when rendering export timestamps.
    pub export_offset_minutes: i32,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is set but unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let store = ConnectionSettings::parse(&get(CONNECTION_ENV_VAR).unwrap_or_default())?;

        let security = Security::parse(&get("REPORTLEDGER_SMTP_SECURITY").unwrap_or_default())?;
        let port = match get("REPORTLEDGER_SMTP_PORT") {
            Some(value) => parse_number("REPORTLEDGER_SMTP_PORT", &value)?,
            None => security.default_port(),
        };
        let smtp = SmtpConfig {
            host: get("REPORTLEDGER_SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port,
            security,
            from: get("REPORTLEDGER_FROM").unwrap_or_default(),
            password: lookup("REPORTLEDGER_APP_PASSWORD").unwrap_or_default(),
        };

        let log_dir = get("REPORTLEDGER_LOG_DIR").map_or_else(default_log_dir, PathBuf::from);
        let max_parallel = match get("REPORTLEDGER_MAX_PARALLEL") {
            Some(value) => parse_number::<usize>("REPORTLEDGER_MAX_PARALLEL", &value)?.max(1),
            None => 1,
        };
        let lookback = match get("REPORTLEDGER_LOOKBACK_DAYS") {
            Some(value) => parse_number("REPORTLEDGER_LOOKBACK_DAYS", &value)?,
            None => 0,
        };
        let export_offset_minutes = match get("REPORTLEDGER_EXPORT_OFFSET_MINUTES") {
            Some(value) => parse_number("REPORTLEDGER_EXPORT_OFFSET_MINUTES", &value)?,
            None => 330,
        };

        Ok(Self {
            store,
            smtp,
            master_path: get("REPORTLEDGER_MASTER_PATH").unwrap_or_default(),
            log_dir,
            log_filter: get(LOG_FILTER_ENV_VAR).unwrap_or_else(|| "info".to_string()),
            max_parallel,
            window: LookBack::days(lookback),
            require_method_email: get("REPORTLEDGER_REQUIRE_METHOD_EMAIL")
                .is_some_and(|v| parse_flag(&v)),
            dry_run: get("REPORTLEDGER_DRY_RUN").is_some_and(|v| parse_flag(&v)),
            export_offset_minutes,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "x"
    )
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reportledger")
        .join("logs")
}
