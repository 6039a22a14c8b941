//! Persistence backends for board snapshots.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Board not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Store error: {0}")]
    Other(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future for async store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A backend that persists one PNG per board.
///
/// Snapshots arrive already encoded; the store never looks inside them.
pub trait BoardStore: Send + Sync {
    /// Persist a board's snapshot, replacing any previous one.
    fn save(&self, board_id: &str, png: &[u8]) -> BoxFuture<'_, StoreResult<()>>;

    /// Load a board's snapshot.
    fn load(&self, board_id: &str) -> BoxFuture<'_, StoreResult<Vec<u8>>>;

    /// Delete a board's snapshot. Deleting an absent board is not an error.
    fn delete(&self, board_id: &str) -> BoxFuture<'_, StoreResult<()>>;

    /// List all persisted board IDs.
    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<String>>>;
}
