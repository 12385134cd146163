use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("Starting ETL process...");

        tracing::info!("Extracting data...");
        let run = self.pipeline.extract().await?;
        tracing::info!(
            "Extracted {} rows from {} chunk(s)",
            run.row_count(),
            run.chunks.len()
        );

        tracing::info!("Transforming data...");
        let output = self.pipeline.transform(run).await?;
        tracing::info!("Rendered {} bytes as {:?}", output.body.len(), output.format);

        tracing::info!("Loading data...");
        let output_path = self.pipeline.load(output).await?;
        tracing::info!(
            "Output saved to: {} ({:.2?})",
            output_path,
            started.elapsed()
        );

        Ok(output_path)
    }
}
