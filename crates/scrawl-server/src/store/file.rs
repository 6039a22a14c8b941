//! File-based snapshot store.

use super::{BoardStore, BoxFuture, StoreError, StoreResult};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Stores each board as a PNG file in a base directory, so persisted
/// boards survive server restarts and are plain images on disk.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at `base_path`, creating the directory
    /// if it does not exist.
    pub fn new(base_path: PathBuf) -> StoreResult<Self> {
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path).map_err(|e| {
                StoreError::Io(format!("Failed to create store directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Get the file path for a board ID.
    fn board_path(&self, board_id: &str) -> PathBuf {
        // Sanitize the ID so it is safe as a filename.
        let safe_id: String = board_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.png", safe_id))
    }
}

impl BoardStore for FileStore {
    fn save(&self, board_id: &str, png: &[u8]) -> BoxFuture<'_, StoreResult<()>> {
        let path = self.board_path(board_id);
        let png = png.to_vec();
        Box::pin(async move {
            fs::write(&path, png).await.map_err(|e| {
                StoreError::Io(format!("Failed to write {}: {}", path.display(), e))
            })
        })
    }

    fn load(&self, board_id: &str) -> BoxFuture<'_, StoreResult<Vec<u8>>> {
        let path = self.board_path(board_id);
        let board_id = board_id.to_string();
        Box::pin(async move {
            match fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(board_id)),
                Err(e) => Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                ))),
            }
        })
    }

    fn delete(&self, board_id: &str) -> BoxFuture<'_, StoreResult<()>> {
        let path = self.board_path(board_id);
        Box::pin(async move {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::Io(format!(
                    "Failed to delete {}: {}",
                    path.display(),
                    e
                ))),
            }
        })
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            let mut entries = fs::read_dir(&base)
                .await
                .map_err(|e| StoreError::Io(format!("Failed to read directory: {}", e)))?;

            let mut ids = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::Io(format!("Failed to read directory: {}", e)))?
            {
                let path = entry.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
            Ok(ids)
        })
    }
}
