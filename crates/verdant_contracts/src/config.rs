#![forbid(unsafe_code)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::{ContractViolation, Validate};

/// Fully resolved database connection profile, produced once at
/// bootstrap and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Always "require"; downgraded modes are not offered.
    pub sslmode: String,
    pub ssl_root_cert: Option<PathBuf>,
    pub connect_timeout_seconds: u64,
    pub statement_timeout_seconds: u64,
    pub application_name: String,
    pub pool_max_age_seconds: u64,
    pub health_checks: bool,
}

impl DbConfig {
    pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 30;
    pub const DEFAULT_STATEMENT_TIMEOUT_SECONDS: u64 = 60;
    pub const DEFAULT_POOL_MAX_AGE_SECONDS: u64 = 600;
}

impl Validate for DbConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.host.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "db_config.host",
            });
        }
        if self.database.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "db_config.database",
            });
        }
        if self.sslmode != "require" {
            return Err(ContractViolation::InvalidValue {
                field: "db_config.sslmode",
                reason: "must be \"require\"",
            });
        }
        if self.port == 0 {
            return Err(ContractViolation::InvalidRange {
                field: "db_config.port",
                min: 1.0,
                max: 65535.0,
                got: 0.0,
            });
        }
        Ok(())
    }
}

/// Outbound platform API settings for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub base_url: String,
    pub api_timeout_seconds: u64,
    pub quick_timeout_seconds: u64,
}

impl DispatcherConfig {
    pub const DEFAULT_API_TIMEOUT_SECONDS: u64 = 30;
    pub const DEFAULT_QUICK_TIMEOUT_SECONDS: u64 = 10;
}

impl Validate for DispatcherConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.base_url.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "dispatcher_config.base_url",
            });
        }
        if self.api_timeout_seconds == 0 || self.quick_timeout_seconds == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "dispatcher_config.timeouts",
                reason: "must be nonzero",
            });
        }
        Ok(())
    }
}

/// Process-wide settings, read from the environment exactly once at
/// init. Handlers receive a shared reference; nothing re-reads env
/// vars mid-request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub db: Option<DbConfig>,
    pub dispatcher: DispatcherConfig,
    pub contact_email: String,
    pub default_from_email: String,
    pub use_embedded_db: bool,
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.dispatcher.validate()?;
        if let Some(db) = &self.db {
            db.validate()?;
        }
        if self.contact_email.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "app_config.contact_email",
            });
        }
        if self.default_from_email.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "app_config.default_from_email",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> DbConfig {
        DbConfig {
            engine: "postgresql".to_string(),
            host: "db.internal".to_string(),
            port: 5432,
            database: "verdant".to_string(),
            user: "verdant".to_string(),
            password: "secret".to_string(),
            sslmode: "require".to_string(),
            ssl_root_cert: None,
            connect_timeout_seconds: DbConfig::DEFAULT_CONNECT_TIMEOUT_SECONDS,
            statement_timeout_seconds: DbConfig::DEFAULT_STATEMENT_TIMEOUT_SECONDS,
            application_name: "verdant_site".to_string(),
            pool_max_age_seconds: DbConfig::DEFAULT_POOL_MAX_AGE_SECONDS,
            health_checks: true,
        }
    }

    #[test]
    fn at_config_01_sslmode_is_pinned_to_require() {
        assert!(db().validate().is_ok());
        let mut downgraded = db();
        downgraded.sslmode = "prefer".to_string();
        assert!(downgraded.validate().is_err());
    }

    #[test]
    fn at_config_02_zero_timeouts_refused() {
        let d = DispatcherConfig {
            base_url: "https://platform.example".to_string(),
            api_timeout_seconds: 0,
            quick_timeout_seconds: DispatcherConfig::DEFAULT_QUICK_TIMEOUT_SECONDS,
        };
        assert!(d.validate().is_err());
    }
}
