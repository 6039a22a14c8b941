//! Scrawl Core Library
//!
//! Transport-agnostic state and wire protocol for the Scrawl shared canvas:
//! stroke encoding, rasterisation, undo history, debounced persistence, and
//! the reconciliation rules that keep every participant's board converged.

pub use kurbo;

pub mod debounce;
pub mod encoder;
pub mod history;
pub mod protocol;
pub mod session;
pub mod snapshot;
pub mod surface;

#[cfg(feature = "transport")]
pub mod connection;

pub use debounce::{SaveDebouncer, DEFAULT_SAVE_DEBOUNCE_MS};
pub use encoder::{Brush, BrushError, StrokeEncoder, Tool};
pub use history::{HistoryStack, HISTORY_CAPACITY};
pub use protocol::{
    ClientMessage, Color, ConnectionState, Participant, ServerMessage, StrokeSegment, StrokeStyle,
    SyncEvent, BRUSH_PALETTE, BRUSH_SIZES, DEFAULT_BOARD_ID, PARTICIPANT_COLORS,
};
pub use session::BoardSession;
pub use snapshot::{Snapshot, SnapshotError};
pub use surface::{Surface, SurfaceError};

#[cfg(feature = "transport")]
pub use connection::ConnectionManager;
