use crate::config::settings::FetchSettings;
use crate::core::carrier::CarrierResolver;
use crate::core::executor::RequestExecutor;
use crate::core::fetcher::{fetch_chunk, FetchContext};
use crate::core::partition::partition;
use crate::core::projector::RowProjector;
use crate::core::scheduler::run_bounded;
use crate::core::serializer;
use crate::core::{Pipeline, Storage};
use crate::domain::model::{FetchRequest, RenderedOutput, RunResult};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::Validate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Fetches every chunk of `request` and returns the rows in chunk order.
/// Either the whole interval succeeds or the run fails; partial results
/// are never returned.
pub async fn run_fetch(
    executor: &RequestExecutor,
    settings: &FetchSettings,
    request: &FetchRequest,
    cancel: &CancellationToken,
) -> Result<RunResult> {
    request.validate()?;
    let base_url = settings.base_url()?;
    if cancel.is_cancelled() {
        return Err(EtlError::Cancelled);
    }

    let carrier_code = CarrierResolver::new(executor, settings)
        .resolve(&request.carrier_token, cancel)
        .await;
    if cancel.is_cancelled() {
        return Err(EtlError::Cancelled);
    }

    let chunks = partition(&request.interval, request.chunk_days);
    info!(
        "🚀 Fetching {} as {} chunk(s), carrier {}, up to {} concurrent",
        request.interval,
        chunks.len(),
        carrier_code,
        request.max_concurrency
    );

    let projector = RowProjector::default();
    let ctx = FetchContext {
        executor,
        settings,
        base_url: &base_url,
        projector: &projector,
        carrier_code: &carrier_code,
        status_code: request.status_token.as_deref(),
        page_size: request.page_size,
        max_pages: request.max_pages,
        cancel,
    };

    let tasks: Vec<_> = chunks
        .into_iter()
        .map(|chunk| fetch_chunk(&ctx, chunk))
        .collect();
    let chunks = run_bounded(tasks, request.max_concurrency).await?;

    if cancel.is_cancelled() {
        return Err(EtlError::Cancelled);
    }

    let run = RunResult {
        carrier_code,
        titles: projector.titles().collect(),
        chunks,
    };
    info!(
        "✅ Fetched {} row(s) over {} page(s)",
        run.row_count(),
        run.pages_fetched()
    );
    Ok(run)
}

/// Serializes a finished run in the requested format.
pub fn render_run(run: &RunResult, request: &FetchRequest) -> Result<RenderedOutput> {
    if request.debug {
        for chunk in &run.chunks {
            debug!("Chunk {} filter: {}", chunk.interval, chunk.filter);
        }
    }
    serializer::render(run, request.format, request.debug)
}

/// Single entry point: validate, fetch, render.
pub async fn fetch_registry(
    settings: &FetchSettings,
    request: &FetchRequest,
    cancel: &CancellationToken,
) -> Result<RenderedOutput> {
    settings.validate()?;
    let executor = RequestExecutor::new(settings)?;
    let run = run_fetch(&executor, settings, request, cancel).await?;
    render_run(&run, request)
}

/// Fetch run wired into the extract / transform / load contract.
pub struct RegistryPipeline<S: Storage> {
    storage: S,
    settings: FetchSettings,
    request: FetchRequest,
    executor: RequestExecutor,
    cancel: CancellationToken,
    output_name: String,
}

impl<S: Storage> RegistryPipeline<S> {
    pub fn new(
        storage: S,
        settings: FetchSettings,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<Self> {
        settings.validate()?;
        request.validate()?;
        let executor = RequestExecutor::new(&settings)?;
        let output_name = format!(
            "mastr_{}_{}.{}",
            request.interval.start(),
            request.interval.end(),
            request.format.extension()
        );

        Ok(Self {
            storage,
            settings,
            request,
            executor,
            cancel,
            output_name,
        })
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for RegistryPipeline<S> {
    async fn extract(&self) -> Result<RunResult> {
        run_fetch(&self.executor, &self.settings, &self.request, &self.cancel).await
    }

    async fn transform(&self, run: RunResult) -> Result<RenderedOutput> {
        render_run(&run, &self.request)
    }

    async fn load(&self, output: RenderedOutput) -> Result<String> {
        debug!(
            "Writing {} bytes of {} to {}",
            output.body.len(),
            output.content_type,
            self.output_name
        );
        self.storage
            .write_file(&self.output_name, output.body.as_bytes())
            .await
    }
}
