//! Board session: the reconciliation engine.
//!
//! One `BoardSession` owns everything a participant needs for one board:
//! surface, history, debouncer, encoder, roster, and the outbound queue.
//! IO stays outside. A transport feeds events in through `handle_event`,
//! the UI calls the pointer and command methods, and whoever owns the
//! socket sends whatever `take_outgoing` returns.
//!
//! Convergence rule: snapshots are the only authoritative state. They
//! always fully overwrite the canvas, which is how late joiners and
//! reconnectors catch up without replaying segment history.

use std::time::Instant;

use kurbo::Point;

use crate::debounce::SaveDebouncer;
use crate::encoder::{Brush, BrushError, StrokeEncoder};
use crate::history::HistoryStack;
use crate::protocol::{
    ClientMessage, ConnectionState, Participant, ServerMessage, StrokeSegment, SyncEvent,
};
use crate::snapshot::{Snapshot, SnapshotError};
use crate::surface::{Surface, SurfaceError};

/// Per-board client state machine.
pub struct BoardSession {
    /// Board this session is joined to.
    board_id: String,
    /// Local participant identity, announced on every (re)join.
    local: Participant,
    /// Latest roster received from the server.
    roster: Vec<Participant>,
    surface: Surface,
    history: HistoryStack,
    debouncer: SaveDebouncer,
    encoder: StrokeEncoder,
    brush: Brush,
    /// Mirror of the transport's state machine.
    connection: ConnectionState,
    /// True from (re)join until the server has answered with board state.
    /// Gates the parked-save replay so server truth, when it exists, wins.
    awaiting_board: bool,
    /// Pending outgoing messages.
    outgoing: Vec<ClientMessage>,
}

impl BoardSession {
    /// Create a session for `board_id` with a blank canvas. The initial
    /// white state seeds the history so the first undo has somewhere to go.
    pub fn new(
        board_id: impl Into<String>,
        local: Participant,
        width: u32,
        height: u32,
    ) -> Result<Self, SurfaceError> {
        let surface = Surface::new(width, height)?;
        let mut history = HistoryStack::new();
        history.push(surface.to_snapshot()?);
        Ok(Self {
            board_id: board_id.into(),
            local,
            roster: Vec::new(),
            surface,
            history,
            debouncer: SaveDebouncer::new(),
            encoder: StrokeEncoder::new(),
            brush: Brush::default(),
            connection: ConnectionState::Disconnected,
            awaiting_board: false,
            outgoing: Vec::new(),
        })
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn participant(&self) -> &Participant {
        &self.local
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// True while a save is on its way to the server.
    pub fn is_saving(&self) -> bool {
        self.debouncer.is_saving()
    }

    /// Timestamp (ms since epoch) of the last acknowledged save.
    pub fn last_saved_at(&self) -> Option<i64> {
        self.debouncer.last_saved_at()
    }

    // --- Transport events ---

    /// Feed one transport event through the reconciliation logic.
    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Connecting => {
                self.connection = ConnectionState::Connecting;
            }
            SyncEvent::Connected => {
                log::info!("connected, joining board {}", self.board_id);
                self.connection = ConnectionState::Connected;
                // The server forgets membership across drops, so identity
                // is announced on every connect, not just the first.
                self.awaiting_board = true;
                self.outgoing.push(ClientMessage::Join {
                    board_id: self.board_id.clone(),
                    participant: self.local.clone(),
                });
                self.outgoing.push(ClientMessage::RequestBoard {
                    board_id: self.board_id.clone(),
                });
                self.outgoing.push(ClientMessage::RequestFullSync);
            }
            SyncEvent::Disconnected => {
                log::info!("disconnected from board {}", self.board_id);
                self.connection = ConnectionState::Disconnected;
                self.roster.clear();
            }
            SyncEvent::Message(message) => self.handle_message(message),
        }
    }

    /// Handle one parsed server frame.
    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::RosterUpdate { participants } => {
                log::debug!("roster update: {} participants", participants.len());
                self.roster = participants;
            }
            ServerMessage::StrokeSegment(segment) => self.apply_remote_segment(segment),
            ServerMessage::FullSnapshot { mut boards } => {
                match boards.remove(&self.board_id) {
                    Some(encoded) => self.overwrite_from_wire(&encoded),
                    // The server holds nothing for this board: initial sync
                    // is answered, and a parked save may now go out.
                    None => self.awaiting_board = false,
                }
            }
            ServerMessage::ClearBoard => {
                // Someone else wiped the board. They already saved; we only
                // follow, without re-broadcasting.
                log::debug!("board cleared remotely");
                self.surface.clear();
                self.debouncer.supersede();
                self.push_history();
            }
            ServerMessage::BoardLoaded { snapshot } => match snapshot {
                Some(encoded) => self.overwrite_from_wire(&encoded),
                // Never saved; keep whatever is drawn locally.
                None => self.awaiting_board = false,
            },
            ServerMessage::SaveAcknowledged { timestamp } => {
                self.debouncer.acknowledge(timestamp);
            }
        }
    }

    fn apply_remote_segment(&mut self, segment: StrokeSegment) {
        // Our own strokes were rendered when drawn; the relay echo is noise.
        if segment.author_id == self.local.id {
            return;
        }
        if segment.board_id != self.board_id {
            log::debug!("ignoring segment for board {}", segment.board_id);
            return;
        }
        if !segment.width.is_finite() || segment.width <= 0.0 {
            log::warn!("dropping segment with invalid width {}", segment.width);
            return;
        }
        // Straight onto the surface. Remote strokes never touch history;
        // only local gestures create entries.
        self.surface.apply_segment(&segment);
    }

    /// Apply an authoritative snapshot: overwrite the canvas and record
    /// exactly one history entry. Anything we meant to save describes
    /// pixels that no longer exist, so outstanding saves are dropped.
    fn overwrite_from_wire(&mut self, encoded: &str) {
        let snapshot = match Snapshot::from_wire(encoded) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("discarding undecodable snapshot: {}", e);
                return;
            }
        };
        if let Err(e) = self.surface.apply_snapshot(&snapshot) {
            log::warn!("discarding undecodable snapshot: {}", e);
            return;
        }
        self.history.push(snapshot);
        self.debouncer.supersede();
        self.awaiting_board = false;
    }

    // --- Local drawing ---

    /// Begin a gesture. The tap dot renders immediately; broadcast happens
    /// only while connected, and a failed brush blocks the whole gesture.
    pub fn pointer_down(&mut self, position: Point) -> Result<(), BrushError> {
        let segment = self
            .encoder
            .begin(&self.board_id, &self.local.id, &self.brush, position)?;
        self.apply_and_broadcast(segment);
        Ok(())
    }

    /// Extend the gesture to `position`. A no-op when no gesture is active.
    pub fn pointer_move(&mut self, position: Point) {
        if let Some(segment) =
            self.encoder
                .advance(&self.board_id, &self.local.id, &self.brush, position)
        {
            self.apply_and_broadcast(segment);
        }
    }

    /// End the gesture: record it in history and schedule a save.
    pub fn pointer_up(&mut self, now: Instant) {
        if self.encoder.finish() {
            self.push_history();
            self.request_save(now);
        }
    }

    fn apply_and_broadcast(&mut self, segment: StrokeSegment) {
        // Local rendering never waits on the link.
        self.surface.apply_segment(&segment);
        // No queueing while offline: dropped segments are recovered by the
        // next full-state sync, not replayed.
        if self.connection == ConnectionState::Connected {
            self.outgoing.push(ClientMessage::StrokeSegment(segment));
        }
    }

    // --- Commands ---

    /// Step back in history and schedule a save of the restored state.
    pub fn undo(&mut self, now: Instant) -> bool {
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        let snapshot = snapshot.clone();
        if let Err(e) = self.surface.apply_snapshot(&snapshot) {
            log::warn!("undo could not render: {}", e);
        }
        self.debouncer.request_save(snapshot, now);
        true
    }

    /// Step forward in history and schedule a save of the restored state.
    pub fn redo(&mut self, now: Instant) -> bool {
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        let snapshot = snapshot.clone();
        if let Err(e) = self.surface.apply_snapshot(&snapshot) {
            log::warn!("redo could not render: {}", e);
        }
        self.debouncer.request_save(snapshot, now);
        true
    }

    /// Wipe the board, tell everyone, and schedule a save of the blank
    /// state.
    pub fn clear(&mut self, now: Instant) {
        self.surface.clear();
        self.push_history();
        if self.connection == ConnectionState::Connected {
            self.outgoing.push(ClientMessage::ClearBoard {
                board_id: self.board_id.clone(),
            });
        }
        self.request_save(now);
    }

    /// Recreate the canvas at new dimensions and re-apply the latest
    /// snapshot, scaled. Segments are never replayed.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.surface.resize(width, height)?;
        if let Some(snapshot) = self.history.current() {
            let snapshot = snapshot.clone();
            self.surface.apply_snapshot(&snapshot)?;
        }
        Ok(())
    }

    /// Current canvas as PNG, with a dated filename suggestion.
    pub fn download_snapshot(&self) -> Result<(Snapshot, String), SnapshotError> {
        let snapshot = self.surface.to_snapshot()?;
        let date = chrono::Utc::now().format("%Y-%m-%d");
        let file_name = format!("board-{}-{}.png", self.board_id, date);
        Ok((snapshot, file_name))
    }

    // --- Pump ---

    /// Drive time-based work. Call once per pump iteration.
    pub fn tick(&mut self, now: Instant) {
        let connected = self.connection == ConnectionState::Connected;
        if let Some(snapshot) = self.debouncer.poll(now, connected) {
            self.queue_save(snapshot);
        }
        // A parked save waits out the initial board reply; if the server
        // answered with content, the overwrite already cancelled it.
        if connected && !self.awaiting_board && self.debouncer.has_parked() {
            if let Some(snapshot) = self.debouncer.take_parked() {
                log::info!("retransmitting save that missed the previous connection");
                self.queue_save(snapshot);
            }
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue_save(&mut self, snapshot: Snapshot) {
        self.outgoing.push(ClientMessage::SaveBoard {
            board_id: self.board_id.clone(),
            snapshot: snapshot.to_wire(),
        });
    }

    fn push_history(&mut self) {
        match self.surface.to_snapshot() {
            Ok(snapshot) => self.history.push(snapshot),
            Err(e) => log::warn!("could not capture canvas for history: {}", e),
        }
    }

    fn request_save(&mut self, now: Instant) {
        match self.surface.to_snapshot() {
            Ok(snapshot) => self.debouncer.request_save(snapshot, now),
            Err(e) => log::warn!("could not capture canvas for save: {}", e),
        }
    }
}
