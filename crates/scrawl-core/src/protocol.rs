//! Wire protocol for board synchronization.
//!
//! Every frame is a JSON object tagged by a `"type"` field in kebab-case.
//! Payloads are validated here, at the boundary; nothing downstream sees
//! untyped JSON.

use std::collections::HashMap;
use std::fmt;

use kurbo::Point;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Board joined when the user does not pick one.
pub const DEFAULT_BOARD_ID: &str = "default-board";

/// Brush colors offered by the toolbar.
pub const BRUSH_PALETTE: [Color; 12] = [
    Color::rgb(0x00, 0x00, 0x00),
    Color::rgb(0xFF, 0xFF, 0xFF),
    Color::rgb(0xFF, 0x00, 0x00),
    Color::rgb(0xFF, 0xA5, 0x00),
    Color::rgb(0xFF, 0xFF, 0x00),
    Color::rgb(0x00, 0x80, 0x00),
    Color::rgb(0x00, 0x00, 0xFF),
    Color::rgb(0x4B, 0x00, 0x82),
    Color::rgb(0xEE, 0x82, 0xEE),
    Color::rgb(0xFF, 0xC0, 0xCB),
    Color::rgb(0xA5, 0x2A, 0x2A),
    Color::rgb(0x80, 0x80, 0x80),
];

/// Brush width presets, in pixels.
pub const BRUSH_SIZES: [f64; 5] = [2.0, 5.0, 10.0, 15.0, 20.0];

/// Colors assigned to participants as roster tags.
pub const PARTICIPANT_COLORS: [Color; 15] = [
    Color::rgb(0xF4, 0x43, 0x36),
    Color::rgb(0xE9, 0x1E, 0x63),
    Color::rgb(0x9C, 0x27, 0xB0),
    Color::rgb(0x67, 0x3A, 0xB7),
    Color::rgb(0x3F, 0x51, 0xB5),
    Color::rgb(0x21, 0x96, 0xF3),
    Color::rgb(0x03, 0xA9, 0xF4),
    Color::rgb(0x00, 0xBC, 0xD4),
    Color::rgb(0x00, 0x96, 0x88),
    Color::rgb(0x4C, 0xAF, 0x50),
    Color::rgb(0x8B, 0xC3, 0x4A),
    Color::rgb(0xCD, 0xDC, 0x39),
    Color::rgb(0xFF, 0xC1, 0x07),
    Color::rgb(0xFF, 0x98, 0x00),
    Color::rgb(0xFF, 0x57, 0x22),
];

/// An opaque RGB color, carried on the wire as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Canvas background.
    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#RRGGBB` string. Returns `None` for anything else.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color `{}`", s)))
    }
}

/// How a segment is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeStyle {
    #[default]
    Solid,
    /// Dashed with pattern `[width, width * 2]`.
    Dotted,
    /// Dot scatter; receivers expand it at render time.
    Spray,
}

/// A board member as shown in the roster.
///
/// `id` is opaque and stable for the life of the session. `display_name`
/// carries no uniqueness guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub color_tag: Color,
}

impl Participant {
    /// New participant with a fresh id and a random roster color.
    pub fn with_name(display_name: impl Into<String>) -> Self {
        let mut rng = rand::rng();
        let color_tag = PARTICIPANT_COLORS[rng.random_range(0..PARTICIPANT_COLORS.len())];
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            color_tag,
        }
    }
}

/// One encoded piece of a stroke gesture.
///
/// Segments are ephemeral: they are broadcast and rendered, never persisted.
/// `sequence_hint` counts segments within a gesture for diagnostics only;
/// receivers must not reorder on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeSegment {
    pub board_id: String,
    pub author_id: String,
    pub start: Point,
    pub end: Point,
    pub color: Color,
    pub width: f64,
    pub style: StrokeStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_hint: Option<u64>,
}

impl StrokeSegment {
    /// A zero-length segment renders as a single dot.
    pub fn is_dot(&self) -> bool {
        self.start == self.end
    }
}

/// Messages sent to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Enter a board and announce identity
    Join {
        board_id: String,
        participant: Participant,
    },
    /// Ask for the latest snapshot of every live board
    RequestFullSync,
    /// Ask for one board's persisted raster
    RequestBoard { board_id: String },
    /// One stroke segment for relay
    StrokeSegment(StrokeSegment),
    /// Wipe the board for everyone
    ClearBoard { board_id: String },
    /// Persist the full canvas (base64 PNG)
    SaveBoard { board_id: String, snapshot: String },
}

/// Messages received from the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Replacement membership list for the joined board
    RosterUpdate { participants: Vec<Participant> },
    /// Relayed stroke segment from another participant
    StrokeSegment(StrokeSegment),
    /// Authoritative snapshots, keyed by board id (base64 PNG values)
    FullSnapshot {
        #[serde(flatten)]
        boards: HashMap<String, String>,
    },
    /// Another participant wiped the board
    ClearBoard,
    /// Reply to `request-board`; `snapshot` is absent for a never-saved board
    BoardLoaded { snapshot: Option<String> },
    /// Persist finished; `timestamp` is ms since the epoch
    SaveAcknowledged { timestamp: i64 },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Events a transport surfaces to the session.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A connection attempt has started
    Connecting,
    /// Transport established; the session must (re)announce itself
    Connected,
    /// Transport lost; the transport keeps retrying on its own
    Disconnected,
    /// A parsed server frame
    Message(ServerMessage),
}
