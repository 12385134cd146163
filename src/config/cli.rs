use crate::config::settings::FetchSettings;
use crate::core::filter::DateLiteral;
use crate::core::Storage;
use crate::domain::model::{
    FetchRequest, OutputFormat, DEFAULT_CARRIER, DEFAULT_MAX_CONCURRENCY, DEFAULT_PAGE_SIZE,
};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(name = "mastr-etl")]
#[command(about = "Date-partitioned export of the Marktstammdatenregister unit grid")]
#[command(version)]
pub struct CliConfig {
    /// TOML settings file; built-in defaults when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Fetch all units commissioned in [start, end).
    Fetch(FetchArgs),
    /// Look up one unit by its MaStR number.
    Detail(DetailArgs),
    /// List the carrier names and codes known to the registry.
    Carriers,
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    /// First day, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub start: String,

    /// Last day, exclusive (YYYY-MM-DD).
    #[arg(long)]
    pub end: String,

    /// Carrier name or numeric code.
    #[arg(long, default_value = DEFAULT_CARRIER)]
    pub carrier: String,

    /// Operating status code, e.g. 35 for "In Betrieb".
    #[arg(long)]
    pub status: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// 0 fetches until the first empty page.
    #[arg(long, default_value_t = 0)]
    pub max_pages: usize,

    /// 0 fetches the interval as one chunk.
    #[arg(long, default_value_t = 0)]
    pub chunk_days: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub max_concurrency: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Wrap JSON output with the filters and upstream URLs used.
    #[arg(long)]
    pub debug: bool,

    /// Overrides `filter.date_literal` from the settings.
    #[arg(long, value_enum)]
    pub date_literal: Option<DateLiteral>,

    /// Write to this file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl FetchArgs {
    pub fn to_request(&self) -> Result<FetchRequest> {
        let request = FetchRequest::from_dates(&self.start, &self.end)?
            .with_carrier(self.carrier.clone())
            .with_status(self.status.clone())
            .with_page_size(self.page_size)
            .with_max_pages(self.max_pages)
            .with_chunk_days(self.chunk_days)
            .with_max_concurrency(self.max_concurrency)
            .with_format(self.format)
            .with_debug(self.debug);
        request.validate()?;
        Ok(request)
    }

    pub fn apply_overrides(&self, settings: &mut FetchSettings) {
        if let Some(literal) = self.date_literal {
            settings.filter.date_literal = literal;
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct DetailArgs {
    #[arg(long)]
    pub mastr: String,
}

impl CliConfig {
    /// Settings from `--config`, or the built-in defaults.
    pub fn load_settings(&self) -> Result<FetchSettings> {
        let settings = match &self.config {
            Some(path) => FetchSettings::from_file(path)?,
            None => FetchSettings::default(),
        };
        Ok(settings)
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Storage for LocalStorage {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<String> {
        let full_path = Path::new(&self.base_path).join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full_path, data).await?;
        Ok(full_path.display().to_string())
    }
}

/// Writes the payload to stdout; `path` is ignored.
#[derive(Debug, Clone, Default)]
pub struct StdoutStorage;

impl Storage for StdoutStorage {
    async fn write_file(&self, _path: &str, data: &[u8]) -> Result<String> {
        use tokio::io::AsyncWriteExt;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(data).await?;
        if !data.ends_with(b"\n") {
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
        Ok("<stdout>".to_string())
    }
}
