use crate::domain::model::{RenderedOutput, RunResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    /// Persists `data` under `path` and returns where it ended up.
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<RunResult>;
    async fn transform(&self, run: RunResult) -> Result<RenderedOutput>;
    async fn load(&self, output: RenderedOutput) -> Result<String>;
}
