//! In-memory snapshot store.

use super::{BoardStore, BoxFuture, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory store for testing and ephemeral deployments. Boards vanish
/// when the server stops.
#[derive(Default)]
pub struct MemoryStore {
    boards: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BoardStore for MemoryStore {
    fn save(&self, board_id: &str, png: &[u8]) -> BoxFuture<'_, StoreResult<()>> {
        let board_id = board_id.to_string();
        let png = png.to_vec();
        Box::pin(async move {
            let mut boards = self
                .boards
                .write()
                .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
            boards.insert(board_id, png);
            Ok(())
        })
    }

    fn load(&self, board_id: &str) -> BoxFuture<'_, StoreResult<Vec<u8>>> {
        let board_id = board_id.to_string();
        Box::pin(async move {
            let boards = self
                .boards
                .read()
                .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
            boards
                .get(&board_id)
                .cloned()
                .ok_or(StoreError::NotFound(board_id))
        })
    }

    fn delete(&self, board_id: &str) -> BoxFuture<'_, StoreResult<()>> {
        let board_id = board_id.to_string();
        Box::pin(async move {
            let mut boards = self
                .boards
                .write()
                .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
            boards.remove(&board_id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<String>>> {
        Box::pin(async move {
            let boards = self
                .boards
                .read()
                .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
            Ok(boards.keys().cloned().collect())
        })
    }
}
