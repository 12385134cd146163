pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{
    cli::{LocalStorage, StdoutStorage},
    CliConfig,
};

pub use config::FetchSettings;
pub use core::{
    etl::EtlEngine,
    pipeline::{fetch_registry, run_fetch, RegistryPipeline},
};
pub use domain::model::{DateInterval, FetchRequest, OutputFormat, RenderedOutput, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
pub use utils::error::{EtlError, Result};
