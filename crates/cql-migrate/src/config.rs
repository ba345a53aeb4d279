//! Migrator configuration

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, MigrateResult};

/// Name of the ledger table that records applied migrations
pub const LEDGER_TABLE: &str = "migrations";

/// Separator between statements inside a migration body
pub const STATEMENT_DELIMITER: char = ';';

/// Configuration for a [`Migrator`](crate::Migrator)
///
/// Deserializable so it can sit inside an application's own config file:
///
/// ```toml
/// [migrations]
/// keyspace = "accounts"
/// override = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Keyspace holding the ledger table, used for the table existence check
    pub keyspace: String,

    /// Re-run migrations whose body changed since they were recorded.
    /// Disabled by default - use with caution!
    #[serde(default, alias = "override")]
    pub allow_override: bool,
}

impl MigratorConfig {
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            allow_override: false,
        }
    }

    pub fn with_override(mut self, allow_override: bool) -> Self {
        self.allow_override = allow_override;
        self
    }

    /// Reject keyspace names the store would not accept as an identifier
    pub fn validate(&self) -> MigrateResult<()> {
        if self.keyspace.is_empty() {
            return Err(MigrateError::InvalidConfig("keyspace must not be empty".to_string()));
        }
        if !self
            .keyspace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(MigrateError::InvalidConfig(format!(
                "keyspace '{}' may only contain letters, digits and underscores",
                self.keyspace
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_defaults_to_disabled() {
        let config: MigratorConfig = serde_json::from_str(r#"{"keyspace": "accounts"}"#).unwrap();
        assert_eq!(config, MigratorConfig::new("accounts"));
        assert!(!config.allow_override);
    }

    #[test]
    fn test_override_alias() {
        let config: MigratorConfig =
            serde_json::from_str(r#"{"keyspace": "accounts", "override": true}"#).unwrap();
        assert!(config.allow_override);
    }

    #[test]
    fn test_validate_keyspace() {
        assert!(MigratorConfig::new("accounts_v2").validate().is_ok());
        assert!(matches!(
            MigratorConfig::new("").validate(),
            Err(MigrateError::InvalidConfig(_))
        ));
        assert!(matches!(
            MigratorConfig::new("accounts; DROP").validate(),
            Err(MigrateError::InvalidConfig(_))
        ));
    }
}
