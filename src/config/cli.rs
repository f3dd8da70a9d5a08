use crate::domain::ports::Storage;
use crate::utils::error::{BuildError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

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

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        tokio::fs::read(&full_path)
            .await
            .map_err(|e| BuildError::io(full_path.display().to_string(), e))
    }

    async fn open_reader(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let full_path = self.full_path(path);
        let file = tokio::fs::File::open(&full_path)
            .await
            .map_err(|e| BuildError::io(full_path.display().to_string(), e))?;
        Ok(Box::new(file.into_std().await))
    }

    /// Writes a sibling temporary file, then renames it over `path`.
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        let io_error = |e| BuildError::io(full_path.display().to_string(), e);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let temp_path = temp_sibling(&full_path);
        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(io_error(e));
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &full_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(io_error(e));
        }
        Ok(())
    }
}
