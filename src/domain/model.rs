use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use chrono::{Days, NaiveDate};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One upstream record as delivered by the grid endpoint.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

pub const MAX_PAGE_SIZE: usize = 5000;
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
pub const DEFAULT_CARRIER: &str = "Solare Strahlungsenergie";

/// Half-open calendar interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateInterval {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(EtlError::invalid_input(format!(
                "'end' ({}) must be after 'start' ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses both bounds from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = validation::parse_iso_date("start", start)?;
        let end = validation::parse_iso_date("end", end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// `start - 1 day`, the bound for a strict `gt` comparison.
    pub fn day_before_start(&self) -> NaiveDate {
        self.start.checked_sub_days(Days::new(1)).unwrap_or(self.start)
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            timeout_ms: 8000,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Same timeout, single attempt.
    pub fn without_retries(&self) -> Self {
        Self {
            max_attempts: 0,
            ..*self
        }
    }

    /// Delay before retry number `attempt` (0-based):
    /// `max(retry_after, base_backoff * 2^attempt)`.
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = self
            .base_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let exponential = Duration::from_millis(exponential);
        match retry_after {
            Some(server) if server > exponential => server,
            _ => exponential,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "text/csv; charset=utf-8",
            OutputFormat::Json => "application/json; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(EtlError::invalid_input(format!(
                "Unsupported format '{}'. Use csv or json.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub records: Vec<RawRecord>,
    pub is_last_page: bool,
}

impl PageResult {
    pub fn new(records: Vec<RawRecord>) -> Self {
        let is_last_page = records.is_empty();
        Self {
            records,
            is_last_page,
        }
    }
}

/// An upstream record normalized into the fixed output schema. Cells keep
/// schema order and every schema column is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedRow {
    cells: Vec<(&'static str, String)>,
}

impl ProjectedRow {
    pub(crate) fn from_cells(cells: Vec<(&'static str, String)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(t, _)| *t == title)
            .map(|(_, v)| v.as_str())
    }

    pub fn titles(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.cells.iter().map(|(t, _)| *t)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for ProjectedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (title, value) in &self.cells {
            map.serialize_entry(title, value)?;
        }
        map.end()
    }
}

/// Outcome of fetching one chunk.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub interval: DateInterval,
    pub filter: String,
    pub first_page_url: String,
    pub rows: Vec<ProjectedRow>,
    pub pages_fetched: usize,
    /// Records dropped by the client-side date check.
    pub discarded: usize,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub carrier_code: String,
    /// Column titles of the projection the rows were built with.
    pub titles: Vec<&'static str>,
    pub chunks: Vec<ChunkResult>,
}

impl RunResult {
    pub fn rows(&self) -> impl Iterator<Item = &ProjectedRow> {
        self.chunks.iter().flat_map(|c| c.rows.iter())
    }

    pub fn row_count(&self) -> usize {
        self.chunks.iter().map(|c| c.rows.len()).sum()
    }

    pub fn pages_fetched(&self) -> usize {
        self.chunks.iter().map(|c| c.pages_fetched).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    pub format: OutputFormat,
    pub content_type: &'static str,
    pub body: String,
}

/// Everything a caller supplies for one run.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub interval: DateInterval,
    pub carrier_token: String,
    pub status_token: Option<String>,
    pub page_size: usize,
    /// 0 = unbounded.
    pub max_pages: usize,
    /// 0 = do not partition.
    pub chunk_days: u32,
    pub max_concurrency: usize,
    pub format: OutputFormat,
    pub debug: bool,
}

impl FetchRequest {
    pub fn new(interval: DateInterval) -> Self {
        Self {
            interval,
            carrier_token: DEFAULT_CARRIER.to_string(),
            status_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: 0,
            chunk_days: 0,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            format: OutputFormat::Csv,
            debug: false,
        }
    }

    pub fn from_dates(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(DateInterval::parse(start, end)?))
    }

    pub fn with_carrier(mut self, token: impl Into<String>) -> Self {
        self.carrier_token = token.into();
        self
    }

    pub fn with_status(mut self, token: Option<String>) -> Self {
        self.status_token = token.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_chunk_days(mut self, chunk_days: u32) -> Self {
        self.chunk_days = chunk_days;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Validate for FetchRequest {
    fn validate(&self) -> Result<()> {
        let as_input = |e: EtlError| EtlError::invalid_input(e.to_string());
        validation::validate_range("page_size", self.page_size, 1, MAX_PAGE_SIZE).map_err(as_input)?;
        validation::validate_positive_number("max_concurrency", self.max_concurrency, 1)
            .map_err(as_input)?;
        Ok(())
    }
}
