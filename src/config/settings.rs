use crate::core::filter::{DateLiteral, LowerBound};
use crate::domain::model::RetryPolicy;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub const DEFAULT_BASE_URL: &str =
    "https://www.marktstammdatenregister.de/MaStR/Einheit/EinheitJson/GetErweiterteOeffentlicheEinheitStromerzeugung";
pub const DEFAULT_FILTER_META_URL: &str =
    "https://www.marktstammdatenregister.de/MaStR/Einheit/EinheitJson/GetFilterColumnsErweiterteOeffentlicheEinheitStromerzeugung";

/// Immutable run configuration. Built once (defaults or TOML file) and
/// passed by reference into every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub upstream: UpstreamConfig,
    pub retry: RetryPolicy,
    pub filter: FilterConfig,
    pub carrier: CarrierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub filter_meta_url: String,
    pub user_agent: String,
    pub referer: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            filter_meta_url: DEFAULT_FILTER_META_URL.to_string(),
            user_agent: concat!("mastr-etl/", env!("CARGO_PKG_VERSION")).to_string(),
            referer: "https://www.marktstammdatenregister.de/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub date_field: String,
    pub carrier_field: String,
    pub status_field: String,
    pub unit_number_field: String,
    pub date_literal: DateLiteral,
    pub lower_bound: LowerBound,
    /// Re-check every record's commissioning date on the client.
    pub post_filter: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            date_field: "InbetriebnahmeDatum".to_string(),
            carrier_field: "Energieträger".to_string(),
            status_field: "BetriebsStatusId".to_string(),
            unit_number_field: "MaStRNummer".to_string(),
            date_literal: DateLiteral::default(),
            lower_bound: LowerBound::default(),
            post_filter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    /// `FilterName` of the metadata entry listing carrier codes.
    pub meta_filter_name: String,
    pub default_code: String,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            meta_filter_name: "Energieträger".to_string(),
            // Solare Strahlungsenergie
            default_code: "2495".to_string(),
        }
    }
}

impl FetchSettings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unknown variables stay verbatim.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn base_url(&self) -> Result<Url> {
        validation::validate_url("upstream.base_url", &self.upstream.base_url)
    }

    pub fn filter_meta_url(&self) -> Result<Url> {
        validation::validate_url("upstream.filter_meta_url", &self.upstream.filter_meta_url)
    }

    pub fn validate_config(&self) -> Result<()> {
        self.base_url()?;
        self.filter_meta_url()?;

        if self.retry.timeout_ms == 0 {
            return Err(EtlError::InvalidConfigValueError {
                field: "retry.timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }

        validation::validate_non_empty_string("filter.date_field", &self.filter.date_field)?;
        validation::validate_non_empty_string("filter.carrier_field", &self.filter.carrier_field)?;
        validation::validate_non_empty_string("filter.status_field", &self.filter.status_field)?;
        validation::validate_non_empty_string(
            "filter.unit_number_field",
            &self.filter.unit_number_field,
        )?;

        if !self.carrier.default_code.chars().all(|c| c.is_ascii_digit())
            || self.carrier.default_code.is_empty()
        {
            return Err(EtlError::InvalidConfigValueError {
                field: "carrier.default_code".to_string(),
                value: self.carrier.default_code.clone(),
                reason: "Carrier codes are numeric".to_string(),
            });
        }

        Ok(())
    }
}

impl Validate for FetchSettings {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let settings = FetchSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.retry, RetryPolicy::default());
        assert_eq!(settings.carrier.default_code, "2495");
        assert!(settings.filter.post_filter);
    }

    #[test]
    fn test_parse_partial_toml_config() {
        let toml_content = r#"
[retry]
max_attempts = 5
timeout_ms = 2000

[filter]
date_literal = "german"
lower_bound = "exclusive"
"#;

        let settings = FetchSettings::from_toml_str(toml_content).unwrap();

        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.timeout_ms, 2000);
        // untouched fields keep their defaults
        assert_eq!(settings.retry.base_backoff_ms, 500);
        assert_eq!(settings.filter.date_literal, DateLiteral::German);
        assert_eq!(settings.filter.lower_bound, LowerBound::Exclusive);
        assert_eq!(settings.filter.date_field, "InbetriebnahmeDatum");
        assert_eq!(settings.upstream.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MASTR_ETL_TEST_BASE_URL", "https://mirror.example.com/grid");

        let toml_content = r#"
[upstream]
base_url = "${MASTR_ETL_TEST_BASE_URL}"
referer = "${MASTR_ETL_TEST_UNSET_VARIABLE}"
"#;

        let settings = FetchSettings::from_toml_str(toml_content).unwrap();
        assert_eq!(settings.upstream.base_url, "https://mirror.example.com/grid");
        assert_eq!(settings.upstream.referer, "${MASTR_ETL_TEST_UNSET_VARIABLE}");

        std::env::remove_var("MASTR_ETL_TEST_BASE_URL");
    }

    #[test]
    fn test_config_validation() {
        let settings = FetchSettings::from_toml_str(
            r#"
[upstream]
base_url = "invalid-url"
"#,
        )
        .unwrap();
        assert!(settings.validate().is_err());

        let settings = FetchSettings::from_toml_str(
            r#"
[carrier]
default_code = "solar"
"#,
        )
        .unwrap();
        assert!(settings.validate().is_err());

        let settings = FetchSettings::from_toml_str(
            r#"
[retry]
timeout_ms = 0
"#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_literal_is_a_parse_error() {
        let result = FetchSettings::from_toml_str(
            r#"
[filter]
date_literal = "epoch"
"#,
        );
        assert!(matches!(
            result,
            Err(EtlError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[carrier]\ndefault_code = \"2497\"\n")
            .unwrap();

        let settings = FetchSettings::from_file(temp_file.path()).unwrap();
        assert_eq!(settings.carrier.default_code, "2497");
        assert_eq!(settings.carrier.meta_filter_name, "Energieträger");
    }
}
