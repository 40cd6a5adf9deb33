use crate::domain::model::{CompileResult, PromptSource};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    /// Prompt documents to compile.
    fn inputs(&self) -> &[String];
    fn output_path(&self) -> &str;
    fn catalog_path(&self) -> Option<&str>;
    fn bundle_name(&self) -> Option<&str>;
    fn strict(&self) -> bool;
    fn default_row_limit(&self) -> Option<u32> {
        None
    }
    fn superset_base_url(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<PromptSource>>;
    async fn transform(&self, sources: Vec<PromptSource>) -> Result<CompileResult>;
    async fn load(&self, result: CompileResult) -> Result<String>;
}
