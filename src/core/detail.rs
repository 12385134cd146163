use crate::config::settings::FetchSettings;
use crate::core::executor::RequestExecutor;
use crate::core::fetcher::{page_url, parse_page};
use crate::core::filter::{build_unit_filter, ticks_to_iso};
use crate::domain::model::RawRecord;
use crate::utils::error::{EtlError, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// ISO companion field and the tick-encoded sources it is read from, in
/// priority order. The first non-null source wins.
const ISO_COMPANIONS: [(&str, &[&str]); 2] = [
    ("EegInbetriebnahmeISO", &["EegInbetriebnahmeDatum"]),
    (
        "InbetriebnahmeAltISO",
        &["Inbetriebnahmedatum der Einheit", "InbetriebnahmeDatum"],
    ),
];

fn enrich(mut record: RawRecord) -> RawRecord {
    for (target, sources) in ISO_COMPANIONS {
        let iso = sources
            .iter()
            .filter_map(|key| record.get(*key))
            .find(|value| !value.is_null())
            .and_then(ticks_to_iso)
            .map_or(Value::Null, Value::String);
        record.insert(target.to_string(), iso);
    }
    record
}

/// Looks up a single unit by its registry number. `Ok(None)` when the
/// registry knows no such unit.
pub async fn lookup_unit(
    executor: &RequestExecutor,
    settings: &FetchSettings,
    unit_number: &str,
    cancel: &CancellationToken,
) -> Result<Option<RawRecord>> {
    let unit_number = unit_number.trim();
    if unit_number.is_empty() {
        return Err(EtlError::invalid_input("missing registry number"));
    }

    let filter = build_unit_filter(&settings.filter, unit_number);
    let url = page_url(&settings.base_url()?, 1, 1, &filter);
    debug!("Unit lookup filter: {}", filter);

    let page = parse_page(executor.get_json(&url, cancel).await?)?;
    let record = page.records.into_iter().next().map(enrich);
    info!(
        "🔎 Unit {} {}",
        unit_number,
        if record.is_some() { "found" } else { "not found" }
    );
    Ok(record)
}
