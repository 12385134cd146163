//! Filter expressions in the registry's Kendo grid grammar
//! (`field~op~literal` clauses chained with `~and~`), plus the inverse
//! direction: reading dates back out of upstream records for the
//! client-side range check.

use crate::config::settings::FilterConfig;
use crate::domain::model::{DateInterval, RawRecord};
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// How a calendar date is written inside a filter literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum DateLiteral {
    /// `datetime'2024-01-01T00:00:00'`
    #[default]
    IsoDateTime,
    /// `'2024-01-01'`
    IsoDate,
    /// `'01.01.2024'`
    German,
    /// `'/Date(1704067200000)/'`, milliseconds since the epoch at UTC midnight.
    Ticks,
}

impl DateLiteral {
    pub fn encode(&self, date: NaiveDate) -> String {
        match self {
            DateLiteral::IsoDateTime => format!("datetime'{}T00:00:00'", date.format("%Y-%m-%d")),
            DateLiteral::IsoDate => format!("'{}'", date.format("%Y-%m-%d")),
            DateLiteral::German => format!("'{}'", date.format("%d.%m.%Y")),
            DateLiteral::Ticks => {
                let millis = date.and_time(NaiveTime::default()).and_utc().timestamp_millis();
                format!("'/Date({})/'", millis)
            }
        }
    }
}

/// Which comparison renders the lower bound. Both produce `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum LowerBound {
    /// `date~ge~start`
    #[default]
    Inclusive,
    /// `date~gt~(start - 1 day)`
    Exclusive,
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn eq_clause(field: &str, value: &str) -> String {
    format!("{}~eq~{}", field, quote(value))
}

/// Renders the filter for one chunk. Pure: same inputs, same string.
pub fn build_filter(
    config: &FilterConfig,
    chunk: &DateInterval,
    carrier_code: &str,
    status_code: Option<&str>,
) -> String {
    let literal = config.date_literal;
    let date_field = &config.date_field;

    let lower = match config.lower_bound {
        LowerBound::Inclusive => format!("{}~ge~{}", date_field, literal.encode(chunk.start())),
        LowerBound::Exclusive => format!(
            "{}~gt~{}",
            date_field,
            literal.encode(chunk.day_before_start())
        ),
    };
    let upper = format!("{}~lt~{}", date_field, literal.encode(chunk.end()));

    let mut clauses = vec![lower, upper, eq_clause(&config.carrier_field, carrier_code)];
    if let Some(status) = status_code {
        clauses.push(eq_clause(&config.status_field, status));
    }
    clauses.join("~and~")
}

/// Exact match on a unit's registry number.
pub fn build_unit_filter(config: &FilterConfig, unit_number: &str) -> String {
    eq_clause(&config.unit_number_field, unit_number)
}

fn parse_ticks(s: &str) -> Option<NaiveDate> {
    let inner = s.strip_prefix("/Date(")?.strip_suffix(")/")?;
    // "/Date(1184889600000+0200)/" carries an offset we ignore
    let digits_end = inner
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(inner.len());
    let millis: i64 = inner[..digits_end].parse().ok()?;
    millis_to_date(millis)
}

fn millis_to_date(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Reads a date in any representation the registry has been seen to
/// return: `/Date(ms)/` ticks, ISO date or date-time, `dd.MM.yyyy`, or a
/// bare millisecond number.
pub fn parse_upstream_date(value: &serde_json::Value) -> Option<NaiveDate> {
    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.starts_with("/Date(") {
                return parse_ticks(s);
            }
            let head = s.get(..10)?;
            NaiveDate::parse_from_str(head, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(head, "%d.%m.%Y"))
                .ok()
        }
        serde_json::Value::Number(n) => n.as_i64().and_then(millis_to_date),
        _ => None,
    }
}

/// `/Date(ms)/` → `YYYY-MM-DD`; anything else → `None`.
pub fn ticks_to_iso(value: &serde_json::Value) -> Option<String> {
    let s = value.as_str()?;
    parse_ticks(s.trim()).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Client-side membership check. `None` when the record carries no
/// readable date under any of `date_keys`.
pub fn record_in_interval(
    record: &RawRecord,
    interval: &DateInterval,
    date_keys: &[&str],
) -> Option<bool> {
    let value = date_keys
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|v| !v.is_null())?;
    parse_upstream_date(value).map(|date| interval.contains(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january() -> DateInterval {
        DateInterval::parse("2024-01-01", "2024-02-01").unwrap()
    }

    #[test]
    fn test_date_literals() {
        let d = date(2024, 1, 1);
        assert_eq!(DateLiteral::IsoDateTime.encode(d), "datetime'2024-01-01T00:00:00'");
        assert_eq!(DateLiteral::IsoDate.encode(d), "'2024-01-01'");
        assert_eq!(DateLiteral::German.encode(d), "'01.01.2024'");
        assert_eq!(DateLiteral::Ticks.encode(d), "'/Date(1704067200000)/'");
    }

    #[test]
    fn test_build_filter_default_strategy() {
        let config = FilterConfig::default();
        let filter = build_filter(&config, &january(), "2495", None);
        assert_eq!(
            filter,
            "InbetriebnahmeDatum~ge~datetime'2024-01-01T00:00:00'\
             ~and~InbetriebnahmeDatum~lt~datetime'2024-02-01T00:00:00'\
             ~and~Energieträger~eq~'2495'"
        );
    }

    #[test]
    fn test_build_filter_exclusive_lower_bound_uses_day_before() {
        let config = FilterConfig {
            lower_bound: LowerBound::Exclusive,
            date_literal: DateLiteral::German,
            ..FilterConfig::default()
        };
        let filter = build_filter(&config, &january(), "2495", Some("35"));
        assert_eq!(
            filter,
            "InbetriebnahmeDatum~gt~'31.12.2023'\
             ~and~InbetriebnahmeDatum~lt~'01.02.2024'\
             ~and~Energieträger~eq~'2495'\
             ~and~BetriebsStatusId~eq~'35'"
        );
    }

    #[test]
    fn test_build_filter_is_deterministic() {
        let config = FilterConfig::default();
        let a = build_filter(&config, &january(), "2497", Some("35"));
        let b = build_filter(&config, &january(), "2497", Some("35"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_unit_filter_escapes_quotes() {
        let config = FilterConfig::default();
        assert_eq!(
            build_unit_filter(&config, "SEE984033548619"),
            "MaStRNummer~eq~'SEE984033548619'"
        );
        assert_eq!(build_unit_filter(&config, "O'Brien"), "MaStRNummer~eq~'O''Brien'");
    }

    #[test]
    fn test_parse_upstream_date_representations() {
        assert_eq!(parse_upstream_date(&json!("/Date(1184889600000)/")), Some(date(2007, 7, 20)));
        assert_eq!(
            parse_upstream_date(&json!("/Date(1184889600000+0200)/")),
            Some(date(2007, 7, 20))
        );
        assert_eq!(parse_upstream_date(&json!("2024-01-05")), Some(date(2024, 1, 5)));
        assert_eq!(parse_upstream_date(&json!("2024-01-05T13:45:00")), Some(date(2024, 1, 5)));
        assert_eq!(parse_upstream_date(&json!("05.01.2024")), Some(date(2024, 1, 5)));
        assert_eq!(parse_upstream_date(&json!(1704067200000i64)), Some(date(2024, 1, 1)));
        assert_eq!(parse_upstream_date(&json!("soon")), None);
        assert_eq!(parse_upstream_date(&json!(null)), None);
    }

    #[test]
    fn test_ticks_to_iso() {
        assert_eq!(ticks_to_iso(&json!("/Date(1184889600000)/")), Some("2007-07-20".to_string()));
        assert_eq!(ticks_to_iso(&json!("2007-07-20")), None);
        assert_eq!(ticks_to_iso(&json!(null)), None);
    }

    #[test]
    fn test_record_in_interval() {
        let keys = ["Inbetriebnahmedatum der Einheit", "InbetriebnahmeDatum"];
        let inside: RawRecord = json!({"Inbetriebnahmedatum der Einheit": null, "InbetriebnahmeDatum": "2024-01-31"})
            .as_object()
            .cloned()
            .unwrap();
        let outside: RawRecord = json!({"InbetriebnahmeDatum": "2024-02-01"})
            .as_object()
            .cloned()
            .unwrap();
        let undated: RawRecord = json!({"Ort": "Berlin"}).as_object().cloned().unwrap();

        assert_eq!(record_in_interval(&inside, &january(), &keys), Some(true));
        assert_eq!(record_in_interval(&outside, &january(), &keys), Some(false));
        assert_eq!(record_in_interval(&undated, &january(), &keys), None);
    }
}
