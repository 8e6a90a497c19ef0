//! Audit store connection parameters.
//!
//! The store is addressed by a semicolon-delimited `key=value` string, e.g.
//! `Server=127.0.0.1;Port=3306;Database=reportlogs;Uid=root;Pwd=secret;SslMode=None`.
//! Keys are case-insensitive and unknown keys are ignored.

use std::collections::HashMap;
use std::fmt;

use url::Url;

use crate::{Error, Result};

/// Environment variable holding the connection string.
pub const CONNECTION_ENV_VAR: &str = "REPORTLOGS_CONN";

/// Relational backend hosting the event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    /// Shared `MySQL` server.
    #[default]
    MySql,
    /// `SQLite` file (single host only).
    Sqlite,
}

impl Provider {
    /// Parse from connection-string representation.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown provider names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::Config(format!("unsupported provider '{other}'"))),
        }
    }
}

/// Transport security for the store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    Disabled,
    /// TLS when the server offers it.
    #[default]
    Preferred,
    /// TLS or fail.
    Required,
}

impl SslMode {
    /// Parse from connection-string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "preferred" => Self::Preferred,
            "none" | "disabled" | "off" | "false" => Self::Disabled,
            _ => Self::Required,
        }
    }

    /// Value of the `ssl-mode` URL parameter understood by the `MySQL` driver.
    #[must_use]
    pub const fn as_mysql_param(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Preferred => "PREFERRED",
            Self::Required => "REQUIRED",
        }
    }
}

/// Parsed connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Backend kind.
    pub provider: Provider,
    /// Server host (default `127.0.0.1`).
    pub server: String,
    /// Server port (default 3306).
    pub port: u16,
    /// Database name, or file path for `SQLite` (default `reportlogs`).
    pub database: String,
    /// User name (default `root`).
    pub user: String,
    /// Password (default empty).
    pub password: String,
    /// Transport security.
    pub ssl_mode: SslMode,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            provider: Provider::MySql,
            server: "127.0.0.1".to_string(),
            port: 3306,
            database: "reportlogs".to_string(),
            user: "root".to_string(),
            password: String::new(),
            ssl_mode: SslMode::Preferred,
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("provider", &self.provider)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl ConnectionSettings {
    /// Parses a `key=value;key=value` connection string.
    ///
    /// Missing keys fall back to the defaults documented on each field.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is not a number or the provider is unknown.
    pub fn parse(raw: &str) -> Result<Self> {
        let pairs: HashMap<String, String> = raw
            .split(';')
            .filter_map(|part| part.split_once('='))
            .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
            .collect();

        let lookup = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| pairs.get(*key).filter(|value| !value.is_empty()))
                .cloned()
        };

        let defaults = Self::default();
        let port = match lookup(&["port"]) {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid port '{port}'")))?,
            None => defaults.port,
        };

        Ok(Self {
            provider: Provider::parse(&lookup(&["provider"]).unwrap_or_default())?,
            server: lookup(&["server", "host"]).unwrap_or(defaults.server),
            port,
            database: lookup(&["database"]).unwrap_or(defaults.database),
            user: lookup(&["uid", "user"]).unwrap_or(defaults.user),
            password: lookup(&["pwd", "password"]).unwrap_or_default(),
            ssl_mode: SslMode::parse(&lookup(&["sslmode"]).unwrap_or_default()),
        })
    }

    /// Reads and parses [`CONNECTION_ENV_VAR`]; an unset variable yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::parse(&std::env::var(CONNECTION_ENV_VAR).unwrap_or_default())
    }

    /// Builds the driver URL for these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot form a valid URL.
    pub fn to_url(&self) -> Result<String> {
        match self.provider {
            Provider::Sqlite => Ok(format!("sqlite:{}?mode=rwc", self.database)),
            Provider::MySql => {
                let mut url = Url::parse(&format!("mysql://{}:{}", self.server, self.port))
                    .map_err(|e| Error::Config(format!("invalid server '{}': {e}", self.server)))?;
                url.set_path(&self.database);
                url.set_username(&self.user)
                    .map_err(|()| Error::Config("invalid user name".into()))?;
                if !self.password.is_empty() {
                    url.set_password(Some(&self.password))
                        .map_err(|()| Error::Config("invalid password".into()))?;
                }
                url.query_pairs_mut()
                    .append_pair("ssl-mode", self.ssl_mode.as_mysql_param())
                    .append_pair("charset", "utf8mb4");
                Ok(url.into())
            }
        }
    }
}
