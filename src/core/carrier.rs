//! Turns a human carrier name ("Solar", "Wind an Land") into the numeric
//! code the grid filter expects, using the registry's filter metadata.

use crate::config::settings::FetchSettings;
use crate::core::executor::RequestExecutor;
use crate::utils::error::{EtlError, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierOption {
    pub name: String,
    pub value: String,
}

fn is_code(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts the option list of the metadata entry named `filter_name`
/// (case-insensitive). Entries without a usable name or value are skipped.
pub fn parse_options(metadata: &Value, filter_name: &str) -> Result<Vec<CarrierOption>> {
    let entries = metadata
        .as_array()
        .ok_or_else(|| EtlError::malformed("filter metadata is not an array"))?;

    let wanted = filter_name.to_lowercase();
    let entry = entries
        .iter()
        .find(|entry| {
            entry
                .get("FilterName")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase() == wanted)
        })
        .ok_or_else(|| {
            EtlError::malformed(format!("filter metadata has no '{}' entry", filter_name))
        })?;

    let list = entry
        .get("ListObject")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EtlError::malformed(format!("'{}' entry carries no ListObject", filter_name))
        })?;

    Ok(list
        .iter()
        .filter_map(|item| {
            let name = item.get("Name").and_then(Value::as_str)?.trim().to_string();
            let value = item.get("Value").and_then(value_text)?;
            Some(CarrierOption { name, value })
        })
        .collect())
}

/// Exact name, then name prefix, then substring; all case-insensitive.
pub fn match_option<'a>(options: &'a [CarrierOption], token: &str) -> Option<&'a CarrierOption> {
    let needle = token.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let names: Vec<String> = options.iter().map(|o| o.name.to_lowercase()).collect();

    let position = names
        .iter()
        .position(|name| *name == needle)
        .or_else(|| names.iter().position(|name| name.starts_with(&needle)))
        .or_else(|| names.iter().position(|name| name.contains(&needle)))?;
    options.get(position)
}

pub struct CarrierResolver<'a> {
    executor: &'a RequestExecutor,
    settings: &'a FetchSettings,
}

impl<'a> CarrierResolver<'a> {
    pub fn new(executor: &'a RequestExecutor, settings: &'a FetchSettings) -> Self {
        Self { executor, settings }
    }

    /// Fetches and parses the carrier options. Single attempt.
    pub async fn list_options(&self, cancel: &CancellationToken) -> Result<Vec<CarrierOption>> {
        let url = self.settings.filter_meta_url()?;
        let policy = self.executor.policy().without_retries();
        let metadata = self.executor.get_json_with(&url, cancel, &policy).await?;
        parse_options(&metadata, &self.settings.carrier.meta_filter_name)
    }

    /// Resolves `token` to a carrier code. Never fails: anything that
    /// cannot be resolved falls back to the configured default code.
    pub async fn resolve(&self, token: &str, cancel: &CancellationToken) -> String {
        let token = token.trim();
        let default_code = &self.settings.carrier.default_code;

        if is_code(token) {
            return token.to_string();
        }
        if token.is_empty() {
            debug!("No carrier given, using default code {}", default_code);
            return default_code.clone();
        }

        let options = match self.list_options(cancel).await {
            Ok(options) => options,
            Err(e) => {
                warn!(
                    "⚠️ Carrier metadata unavailable ({}), using default code {}",
                    e, default_code
                );
                return default_code.clone();
            }
        };

        match match_option(&options, token) {
            Some(option) => {
                info!("🔎 Carrier '{}' resolved to {} ({})", token, option.value, option.name);
                option.value.clone()
            }
            None => {
                warn!(
                    "⚠️ No carrier matches '{}', using default code {}",
                    token, default_code
                );
                default_code.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> Value {
        json!([
            {"FilterName": "Bundesland", "ListObject": [{"Name": "Bayern", "Value": 1403}]},
            {"FilterName": "Energieträger", "ListObject": [
                {"Name": "Solare Strahlungsenergie", "Value": 2495},
                {"Name": "Wind", "Value": "2497"},
                {"Name": "Windkraft auf See", "Value": 2498},
                {"Name": "Biomasse", "Value": 2493},
                {"Name": "Ohne Wert", "Value": null}
            ]}
        ])
    }

    fn options() -> Vec<CarrierOption> {
        parse_options(&metadata(), "energieträger").unwrap()
    }

    #[test]
    fn test_parse_options() {
        let options = options();
        assert_eq!(options.len(), 4);
        assert_eq!(
            options[0],
            CarrierOption {
                name: "Solare Strahlungsenergie".to_string(),
                value: "2495".to_string()
            }
        );
        assert_eq!(options[1].value, "2497");
    }

    #[test]
    fn test_parse_options_rejects_unknown_shapes() {
        assert!(parse_options(&json!({"FilterName": "x"}), "Energieträger").is_err());
        assert!(parse_options(&json!([]), "Energieträger").is_err());
        assert!(parse_options(&json!([{"FilterName": "Energieträger"}]), "Energieträger").is_err());
    }

    #[test]
    fn test_match_priority() {
        let options = options();
        // exact beats prefix: "wind" is also a prefix of "Windkraft auf See"
        assert_eq!(match_option(&options, "WIND").unwrap().value, "2497");
        assert_eq!(match_option(&options, "windkraft").unwrap().value, "2498");
        assert_eq!(match_option(&options, "solar").unwrap().value, "2495");
        // substring only
        assert_eq!(match_option(&options, "strahlung").unwrap().value, "2495");
        assert_eq!(match_option(&options, "see").unwrap().value, "2498");
        assert!(match_option(&options, "Kernenergie").is_none());
        assert!(match_option(&options, "  ").is_none());
    }

    #[test]
    fn test_is_code() {
        assert!(is_code("2495"));
        assert!(!is_code(""));
        assert!(!is_code("24a5"));
    }

    #[tokio::test]
    async fn test_numeric_and_empty_tokens_skip_network() {
        let mut settings = FetchSettings::default();
        settings.upstream.filter_meta_url = "http://127.0.0.1:9/meta".to_string();
        settings.carrier.default_code = "1111".to_string();
        let executor = RequestExecutor::new(&settings).unwrap();
        let resolver = CarrierResolver::new(&executor, &settings);
        let cancel = CancellationToken::new();

        assert_eq!(resolver.resolve(" 2497 ", &cancel).await, "2497");
        assert_eq!(resolver.resolve("", &cancel).await, "1111");
    }

    #[tokio::test]
    async fn test_cancelled_lookup_falls_back() {
        let settings = FetchSettings::default();
        let executor = RequestExecutor::new(&settings).unwrap();
        let resolver = CarrierResolver::new(&executor, &settings);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(resolver.resolve("Wind", &cancel).await, "2495");
    }
}
