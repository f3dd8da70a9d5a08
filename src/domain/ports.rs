use crate::core::allow_list::StudySetup;
use crate::domain::model::BuildArtifact;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::io::Read;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;

    /// Blocking reader over `path`, consumed off the async runtime.
    ///
    /// The default buffers the whole file through `read_file`; stores that can
    /// stream should override it.
    fn open_reader(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Box<dyn Read + Send>>> + Send {
        async move {
            let bytes = self.read_file(path).await?;
            Ok(Box::new(std::io::Cursor::new(bytes)) as Box<dyn Read + Send>)
        }
    }

    /// Replaces `path` in one step: readers see either the old bytes or the new ones.
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<StudySetup>;
    async fn transform(&self, setup: StudySetup) -> Result<BuildArtifact>;
    async fn load(&self, artifact: BuildArtifact) -> Result<String>;
}
