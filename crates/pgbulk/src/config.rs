use crate::error::{BulkError, BulkResult};
use crate::ident::is_bare_name;
use serde::Deserialize;

/// Configuration for [`Bulk`](crate::Bulk).
///
/// Deserializes from TOML (or any serde format); missing keys take their
/// defaults.
///
/// ```toml
/// update_alias = "ut1"
/// join_alias = "jt1"
/// max_parameters = 65535
/// max_log_sql_length = 200
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkConfig {
    /// Alias of the target table in UPDATE and DELETE statements.
    pub update_alias: String,
    /// Alias of the derived table joined by UPDATE and DELETE.
    pub join_alias: String,
    /// Largest number of bound parameters a statement may carry.
    pub max_parameters: usize,
    /// SQL longer than this is truncated in log output.
    pub max_log_sql_length: usize,
}

/// PostgreSQL's wire protocol caps bind parameters at 65535.
pub const PG_MAX_PARAMETERS: usize = 65535;

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            update_alias: "ut1".to_string(),
            join_alias: "jt1".to_string(),
            max_parameters: PG_MAX_PARAMETERS,
            max_log_sql_length: 200,
        }
    }
}

impl BulkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> BulkResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| BulkError::validation(format!("invalid bulk config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the alias of the UPDATE/DELETE target.
    pub fn update_alias(mut self, alias: impl Into<String>) -> Self {
        self.update_alias = alias.into();
        self
    }

    /// Set the derived-table alias.
    pub fn join_alias(mut self, alias: impl Into<String>) -> Self {
        self.join_alias = alias.into();
        self
    }

    pub fn max_parameters(mut self, n: usize) -> Self {
        self.max_parameters = n;
        self
    }

    pub fn max_log_sql_length(mut self, n: usize) -> Self {
        self.max_log_sql_length = n;
        self
    }

    /// Aliases must be distinct bare identifiers; the parameter limit must be
    /// within the protocol's.
    pub fn validate(&self) -> BulkResult<()> {
        for (key, alias) in [
            ("update_alias", &self.update_alias),
            ("join_alias", &self.join_alias),
        ] {
            if !is_bare_name(alias) {
                return Err(BulkError::validation(format!(
                    "{key} '{alias}' must be a lower-case unreserved identifier"
                )));
            }
        }
        if self.update_alias == self.join_alias {
            return Err(BulkError::validation(format!(
                "update_alias and join_alias must differ (both '{}')",
                self.join_alias
            )));
        }
        if self.max_parameters == 0 || self.max_parameters > PG_MAX_PARAMETERS {
            return Err(BulkError::validation(format!(
                "max_parameters must be between 1 and {PG_MAX_PARAMETERS}, got {}",
                self.max_parameters
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BulkConfig::default();
        assert_eq!(config.update_alias, "ut1");
        assert_eq!(config.join_alias, "jt1");
        assert_eq!(config.max_parameters, 65535);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_and_fills_defaults() {
        let config = BulkConfig::from_toml_str("join_alias = \"src\"\nmax_parameters = 1000\n").unwrap();
        assert_eq!(config.join_alias, "src");
        assert_eq!(config.update_alias, "ut1");
        assert_eq!(config.max_parameters, 1000);
    }

    #[test]
    fn toml_rejects_unknown_keys_and_bad_values() {
        assert!(BulkConfig::from_toml_str("alias = \"x\"").is_err());
        assert!(BulkConfig::from_toml_str("join_alias = \"Bad Alias\"").is_err());
        assert!(BulkConfig::from_toml_str("join_alias = \"ut1\"").is_err());
        assert!(BulkConfig::from_toml_str("max_parameters = 70000").is_err());
    }
}
