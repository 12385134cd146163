use crate::config::settings::FetchSettings;
use crate::core::executor::RequestExecutor;
use crate::core::filter::{build_filter, record_in_interval};
use crate::core::projector::{RowProjector, COMMISSIONING_DATE};
use crate::domain::model::{ChunkResult, DateInterval, PageResult, RawRecord};
use crate::utils::error::{EtlError, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Keys under which the grid endpoint has been seen to wrap its records.
const RECORD_KEYS: [&str; 3] = ["Data", "data", "Items"];

/// Parameters shared by every chunk of one run.
pub struct FetchContext<'a> {
    pub executor: &'a RequestExecutor,
    pub settings: &'a FetchSettings,
    pub base_url: &'a Url,
    pub projector: &'a RowProjector,
    pub carrier_code: &'a str,
    pub status_code: Option<&'a str>,
    pub page_size: usize,
    /// 0 = unbounded.
    pub max_pages: usize,
    pub cancel: &'a CancellationToken,
}

/// Grid URL for one page (1-based).
pub fn page_url(base: &Url, page: usize, page_size: usize, filter: &str) -> Url {
    let skip = page.saturating_sub(1).saturating_mul(page_size);
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("group", "")
        .append_pair("sort", "")
        .append_pair("aggregate", "")
        .append_pair("page", &page.to_string())
        .append_pair("pageSize", &page_size.to_string())
        .append_pair("skip", &skip.to_string())
        .append_pair("take", &page_size.to_string())
        .append_pair("filter", filter);
    url
}

// JavaScript truthiness, which is what the registry's `Error` flag follows.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

fn into_records(items: Vec<Value>) -> Result<Vec<RawRecord>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(EtlError::malformed(format!(
                "record {} is not an object: {}",
                i, other
            ))),
        })
        .collect()
}

/// Interprets one grid response body.
pub fn parse_page(body: Value) -> Result<PageResult> {
    match body {
        Value::Array(items) => Ok(PageResult::new(into_records(items)?)),
        Value::Object(mut object) => {
            if is_truthy(object.get("Error")) {
                let text = |key: &str, fallback: &str| {
                    object
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or(fallback)
                        .to_string()
                };
                return Err(EtlError::UpstreamStructured {
                    kind: text("Type", "?"),
                    message: text("Message", "no message"),
                });
            }
            for key in RECORD_KEYS {
                if let Some(Value::Array(items)) = object.remove(key) {
                    return Ok(PageResult::new(into_records(items)?));
                }
            }
            Err(EtlError::malformed(
                "response object carries no Data, data or Items array",
            ))
        }
        other => Err(EtlError::malformed(format!(
            "unexpected response body: {}",
            other
        ))),
    }
}

/// Fetches every page of one chunk until an empty page or the page cap.
pub async fn fetch_chunk(ctx: &FetchContext<'_>, chunk: DateInterval) -> Result<ChunkResult> {
    let settings = &ctx.settings.filter;
    let filter = build_filter(settings, &chunk, ctx.carrier_code, ctx.status_code);
    let first_page_url = page_url(ctx.base_url, 1, ctx.page_size, &filter).to_string();
    let date_keys = ctx.projector.source_keys(COMMISSIONING_DATE);

    debug!("Chunk {} filter: {}", chunk, filter);

    let mut rows = Vec::new();
    let mut pages_fetched = 0;
    let mut discarded = 0;
    let mut page = 1;

    while ctx.max_pages == 0 || page <= ctx.max_pages {
        if ctx.cancel.is_cancelled() {
            return Err(EtlError::Cancelled);
        }

        let url = page_url(ctx.base_url, page, ctx.page_size, &filter);
        let result = parse_page(ctx.executor.get_json(&url, ctx.cancel).await?)?;
        pages_fetched += 1;

        if result.is_last_page {
            debug!("Chunk {}: page {} is empty, done", chunk, page);
            break;
        }
        debug!("Chunk {}: page {} returned {} record(s)", chunk, page, result.records.len());

        for record in &result.records {
            if settings.post_filter && record_in_interval(record, &chunk, date_keys) == Some(false) {
                discarded += 1;
                continue;
            }
            rows.push(ctx.projector.project(record));
        }
        page += 1;
    }

    if discarded > 0 {
        info!(
            "🧹 Chunk {}: discarded {} record(s) dated outside the chunk",
            chunk, discarded
        );
    }
    info!(
        "📦 Chunk {}: {} row(s) from {} page(s)",
        chunk,
        rows.len(),
        pages_fetched
    );

    Ok(ChunkResult {
        interval: chunk,
        filter,
        first_page_url,
        rows,
        pages_fetched,
        discarded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_url_parameters() {
        let base = Url::parse("https://example.com/grid").unwrap();
        let url = page_url(&base, 3, 500, "Energieträger~eq~'2495'");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("page"), Some("3"));
        assert_eq!(get("pageSize"), Some("500"));
        assert_eq!(get("skip"), Some("1000"));
        assert_eq!(get("take"), Some("500"));
        assert_eq!(get("group"), Some(""));
        assert_eq!(get("filter"), Some("Energieträger~eq~'2495'"));
        // the raw query must not carry the filter unencoded
        assert!(!url.query().unwrap().contains('\''));
    }

    #[test]
    fn test_parse_page_shapes() {
        let bare = parse_page(json!([{"Ort": "Kiel"}])).unwrap();
        assert_eq!(bare.records.len(), 1);
        assert!(!bare.is_last_page);

        for key in RECORD_KEYS {
            let wrapped = parse_page(json!({ key: [{"Ort": "Kiel"}, {"Ort": "Bonn"}], "Total": 2 })).unwrap();
            assert_eq!(wrapped.records.len(), 2);
        }

        let empty = parse_page(json!({"Data": [], "Total": 0})).unwrap();
        assert!(empty.is_last_page);
    }

    #[test]
    fn test_parse_page_structured_error() {
        let err = parse_page(json!({"Error": true, "Type": "Filter", "Message": "bad literal"})).unwrap_err();
        match err {
            EtlError::UpstreamStructured { kind, message } => {
                assert_eq!(kind, "Filter");
                assert_eq!(message, "bad literal");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = parse_page(json!({"Error": "yes"})).unwrap_err();
        assert!(matches!(
            err,
            EtlError::UpstreamStructured { ref kind, ref message } if kind == "?" && message == "no message"
        ));

        // a falsy Error flag is not an error
        assert!(parse_page(json!({"Error": false, "Data": []})).is_ok());
    }

    #[test]
    fn test_parse_page_malformed() {
        assert!(matches!(
            parse_page(json!("html?")),
            Err(EtlError::UpstreamMalformed { .. })
        ));
        assert!(matches!(
            parse_page(json!({"Total": 3})),
            Err(EtlError::UpstreamMalformed { .. })
        ));
        assert!(matches!(
            parse_page(json!([1, 2])),
            Err(EtlError::UpstreamMalformed { .. })
        ));
    }
}
