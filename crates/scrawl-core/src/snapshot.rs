//! Full-raster canvas captures.
//!
//! A snapshot is the only unit of authoritative state: it fully overwrites
//! whatever canvas it lands on. Segments are ephemeral and never persisted.
//! On the wire a snapshot travels as base64-encoded PNG.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;
use tiny_skia::Pixmap;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid PNG payload: {0}")]
    Png(String),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// An immutable PNG-encoded capture of the whole canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    png: Vec<u8>,
}

impl Snapshot {
    /// Wrap raw PNG bytes. The bytes are not validated until drawn.
    pub fn from_png_bytes(png: Vec<u8>) -> Self {
        Self { png }
    }

    /// Capture a pixmap.
    pub fn from_pixmap(pixmap: &Pixmap) -> Result<Self, SnapshotError> {
        let png = pixmap
            .encode_png()
            .map_err(|e| SnapshotError::Encode(e.to_string()))?;
        Ok(Self { png })
    }

    /// Decode the wire form.
    pub fn from_wire(encoded: &str) -> Result<Self, SnapshotError> {
        Ok(Self { png: STANDARD.decode(encoded)? })
    }

    /// Encode for the wire.
    pub fn to_wire(&self) -> String {
        STANDARD.encode(&self.png)
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    /// Decode into a pixmap for drawing.
    pub fn to_pixmap(&self) -> Result<Pixmap, SnapshotError> {
        Pixmap::decode_png(&self.png).map_err(|e| SnapshotError::Png(e.to_string()))
    }
}
