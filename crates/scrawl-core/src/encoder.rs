//! Stroke encoder.
//!
//! Turns raw pointer positions into wire segments. One segment per move:
//! `start` is the previous position, `end` the current one. Pointer-down
//! emits a zero-length segment so a tap leaves a dot.

use kurbo::Point;
use thiserror::Error;

use crate::protocol::{Color, StrokeSegment, StrokeStyle};

#[derive(Debug, Error)]
pub enum BrushError {
    #[error("brush width must be positive and finite, got {0}")]
    InvalidWidth(f64),
}

/// Drawing tool selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    /// Paints canvas white; not a compositing mode.
    Eraser,
}

/// Current drawing settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    pub color: Color,
    pub width: f64,
    pub style: StrokeStyle,
    pub tool: Tool,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 5.0,
            style: StrokeStyle::Solid,
            tool: Tool::Brush,
        }
    }
}

impl Brush {
    /// The color that goes on the wire. The eraser is white paint.
    pub fn resolved_color(&self) -> Color {
        match self.tool {
            Tool::Brush => self.color,
            Tool::Eraser => Color::WHITE,
        }
    }

    pub fn validate(&self) -> Result<(), BrushError> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(BrushError::InvalidWidth(self.width));
        }
        Ok(())
    }
}

/// Tracks the in-flight gesture and stamps out segments.
#[derive(Debug, Default)]
pub struct StrokeEncoder {
    gesture: Option<Gesture>,
}

#[derive(Debug)]
struct Gesture {
    last: Point,
    sequence: u64,
}

impl StrokeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.gesture.is_some()
    }

    /// Begin a gesture at `position`. Validates the brush first; on failure
    /// no gesture starts and nothing is emitted.
    pub fn begin(
        &mut self,
        board_id: &str,
        author_id: &str,
        brush: &Brush,
        position: Point,
    ) -> Result<StrokeSegment, BrushError> {
        brush.validate()?;
        self.gesture = Some(Gesture { last: position, sequence: 0 });
        Ok(make_segment(board_id, author_id, brush, position, position, 0))
    }

    /// Continue the gesture. `None` when no gesture is active, which is the
    /// normal case for moves with the button up.
    pub fn advance(
        &mut self,
        board_id: &str,
        author_id: &str,
        brush: &Brush,
        position: Point,
    ) -> Option<StrokeSegment> {
        let gesture = self.gesture.as_mut()?;
        gesture.sequence += 1;
        let start = gesture.last;
        gesture.last = position;
        let sequence = gesture.sequence;
        Some(make_segment(board_id, author_id, brush, start, position, sequence))
    }

    /// End the gesture. Returns whether one was active.
    pub fn finish(&mut self) -> bool {
        self.gesture.take().is_some()
    }
}

fn make_segment(
    board_id: &str,
    author_id: &str,
    brush: &Brush,
    start: Point,
    end: Point,
    sequence: u64,
) -> StrokeSegment {
    StrokeSegment {
        board_id: board_id.to_string(),
        author_id: author_id.to_string(),
        start,
        end,
        color: brush.resolved_color(),
        width: brush.width,
        style: brush.style,
        sequence_hint: Some(sequence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brush(width: f64) -> Brush {
        Brush { width, ..Brush::default() }
    }

    #[test]
    fn test_begin_emits_tap_dot() {
        let mut encoder = StrokeEncoder::new();
        let seg = encoder
            .begin("b1", "a1", &brush(5.0), Point::new(7.0, 9.0))
            .unwrap();
        assert!(seg.is_dot());
        assert_eq!(seg.end, Point::new(7.0, 9.0));
        assert_eq!(seg.sequence_hint, Some(0));
        assert!(encoder.is_active());
    }

    #[test]
    fn test_moves_chain_from_previous_position() {
        let mut encoder = StrokeEncoder::new();
        encoder.begin("b1", "a1", &brush(5.0), Point::new(0.0, 0.0)).unwrap();

        let seg = encoder.advance("b1", "a1", &brush(5.0), Point::new(10.0, 10.0)).unwrap();
        assert_eq!(seg.start, Point::new(0.0, 0.0));
        assert_eq!(seg.end, Point::new(10.0, 10.0));
        assert_eq!(seg.sequence_hint, Some(1));

        let seg = encoder.advance("b1", "a1", &brush(5.0), Point::new(20.0, 5.0)).unwrap();
        assert_eq!(seg.start, Point::new(10.0, 10.0));
        assert_eq!(seg.end, Point::new(20.0, 5.0));
        assert_eq!(seg.sequence_hint, Some(2));
    }

    #[test]
    fn test_move_without_gesture_emits_nothing() {
        let mut encoder = StrokeEncoder::new();
        assert!(encoder.advance("b1", "a1", &brush(5.0), Point::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn test_finish_closes_gesture() {
        let mut encoder = StrokeEncoder::new();
        encoder.begin("b1", "a1", &brush(5.0), Point::new(0.0, 0.0)).unwrap();
        assert!(encoder.finish());
        assert!(!encoder.is_active());
        assert!(encoder.advance("b1", "a1", &brush(5.0), Point::new(1.0, 1.0)).is_none());
        assert!(!encoder.finish());
    }

    #[test]
    fn test_invalid_width_blocks_gesture() {
        let mut encoder = StrokeEncoder::new();
        for bad in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let err = encoder.begin("b1", "a1", &brush(bad), Point::new(0.0, 0.0));
            assert!(matches!(err, Err(BrushError::InvalidWidth(_))));
            assert!(!encoder.is_active());
        }
    }

    #[test]
    fn test_eraser_resolves_to_white() {
        let eraser = Brush { tool: Tool::Eraser, color: Color::BLACK, ..Brush::default() };
        let mut encoder = StrokeEncoder::new();
        let seg = encoder.begin("b1", "a1", &eraser, Point::new(0.0, 0.0)).unwrap();
        assert_eq!(seg.color, Color::WHITE);
    }
}
