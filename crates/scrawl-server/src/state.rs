//! Shared server state: active boards, rosters, and snapshot caches.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use scrawl_core::protocol::{Participant, ServerMessage};

use crate::store::BoardStore;

const CHANNEL_CAPACITY: usize = 256;

/// A frame on a board's broadcast channel: the connection it came from
/// plus the message. Server-originated frames use the nil UUID so no
/// subscriber filters them out.
pub type BoardFrame = (Uuid, ServerMessage);

/// One active board.
struct Board {
    /// Broadcast channel for this board.
    tx: broadcast::Sender<BoardFrame>,
    /// Joined participants in join order, keyed by connection.
    roster: Vec<(Uuid, Participant)>,
    /// Latest known snapshot (wire encoding), fed to the periodic sync.
    latest: Option<String>,
}

impl Board {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            roster: Vec::new(),
            latest: None,
        }
    }

    fn participants(&self) -> Vec<Participant> {
        self.roster.iter().map(|(_, p)| p.clone()).collect()
    }
}

/// Shared application state.
pub struct AppState {
    /// Boards with at least one connected participant. Persisted state
    /// outlives this map; an empty board is re-created on the next join.
    boards: DashMap<String, Board>,
    /// Snapshot persistence backend.
    store: Arc<dyn BoardStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn BoardStore>) -> Self {
        Self {
            boards: DashMap::new(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    /// Add a participant to a board, creating the board if needed.
    /// Returns the channel receiver and the roster after the join.
    pub fn join(
        &self,
        board_id: &str,
        conn_id: Uuid,
        participant: Participant,
    ) -> (broadcast::Receiver<BoardFrame>, Vec<Participant>) {
        let mut board = self
            .boards
            .entry(board_id.to_string())
            .or_insert_with(Board::new);
        board.roster.retain(|(id, _)| *id != conn_id);
        board.roster.push((conn_id, participant));
        (board.tx.subscribe(), board.participants())
    }

    /// Remove a participant. Returns the remaining roster, or `None` when
    /// the board emptied and was dropped (nobody left to notify).
    pub fn leave(&self, board_id: &str, conn_id: Uuid) -> Option<Vec<Participant>> {
        let mut board = self.boards.get_mut(board_id)?;
        board.roster.retain(|(id, _)| *id != conn_id);
        if board.roster.is_empty() {
            drop(board);
            self.boards.remove(board_id);
            return None;
        }
        Some(board.participants())
    }

    /// Broadcast a frame to everyone on a board.
    pub fn broadcast(&self, board_id: &str, from: Uuid, msg: ServerMessage) {
        if let Some(board) = self.boards.get(board_id) {
            let _ = board.tx.send((from, msg));
        }
    }

    /// Broadcast a frame to every active board.
    pub fn broadcast_all(&self, msg: &ServerMessage) {
        for board in self.boards.iter() {
            let _ = board.tx.send((Uuid::nil(), msg.clone()));
        }
    }

    /// Record the latest snapshot for a board.
    pub fn update_snapshot(&self, board_id: &str, wire: String) {
        if let Some(mut board) = self.boards.get_mut(board_id) {
            board.latest = Some(wire);
        }
    }

    /// Latest cached snapshot for a board, if any.
    pub fn cached_snapshot(&self, board_id: &str) -> Option<String> {
        self.boards.get(board_id).and_then(|b| b.latest.clone())
    }

    /// Drop a board's cached snapshot (after a clear).
    pub fn clear_snapshot(&self, board_id: &str) {
        if let Some(mut board) = self.boards.get_mut(board_id) {
            board.latest = None;
        }
    }

    /// Latest snapshots of all active boards, keyed by board ID.
    pub fn snapshot_map(&self) -> HashMap<String, String> {
        self.boards
            .iter()
            .filter_map(|b| b.latest.clone().map(|wire| (b.key().clone(), wire)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use scrawl_core::protocol::Color;

    fn state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()))
    }

    fn participant(name: &str) -> Participant {
        Participant {
            id: name.to_string(),
            display_name: name.to_string(),
            color_tag: Color::BLACK,
        }
    }

    #[test]
    fn test_join_builds_roster_in_order() {
        let state = state();
        let (_rx_a, roster) = state.join("b1", Uuid::new_v4(), participant("ann"));
        assert_eq!(roster.len(), 1);

        let (_rx_b, roster) = state.join("b1", Uuid::new_v4(), participant("bob"));
        let names: Vec<_> = roster.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["ann", "bob"]);
    }

    #[test]
    fn test_rejoin_replaces_roster_entry() {
        let state = state();
        let conn = Uuid::new_v4();
        state.join("b1", conn, participant("ann"));
        let (_rx, roster) = state.join("b1", conn, participant("ann"));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_leave_drops_empty_board() {
        let state = state();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        state.join("b1", conn_a, participant("ann"));
        state.join("b1", conn_b, participant("bob"));

        let roster = state.leave("b1", conn_a).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(state.leave("b1", conn_b), None);

        // Cache went with the board.
        assert_eq!(state.cached_snapshot("b1"), None);
    }

    #[test]
    fn test_snapshot_cache_and_map() {
        let state = state();
        state.join("b1", Uuid::new_v4(), participant("ann"));
        state.join("b2", Uuid::new_v4(), participant("bob"));

        state.update_snapshot("b1", "AAAA".to_string());
        assert_eq!(state.cached_snapshot("b1"), Some("AAAA".to_string()));

        let map = state.snapshot_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("b1"), Some(&"AAAA".to_string()));

        state.clear_snapshot("b1");
        assert!(state.snapshot_map().is_empty());
    }

    #[test]
    fn test_update_snapshot_for_unknown_board_is_noop() {
        let state = state();
        state.update_snapshot("ghost", "AAAA".to_string());
        assert_eq!(state.cached_snapshot("ghost"), None);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let state = state();
        let conn = Uuid::new_v4();
        let (mut rx, _) = state.join("b1", conn, participant("ann"));

        state.broadcast("b1", conn, ServerMessage::ClearBoard);
        let (from, msg) = rx.recv().await.unwrap();
        assert_eq!(from, conn);
        assert!(matches!(msg, ServerMessage::ClearBoard));

        state.broadcast_all(&ServerMessage::ClearBoard);
        let (from, _) = rx.recv().await.unwrap();
        assert_eq!(from, Uuid::nil());
    }
}
