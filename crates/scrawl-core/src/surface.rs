//! Render engine.
//!
//! Applies stroke segments and snapshots to an in-memory raster. Segments
//! draw on top of whatever is there; snapshots replace everything. The
//! surface never talks to the network and never touches history.

use kurbo::Point;
use rand::Rng;
use thiserror::Error;
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, StrokeDash,
    Transform,
};

use crate::protocol::{Color, StrokeSegment, StrokeStyle};
use crate::snapshot::{Snapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("invalid surface dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

const CANVAS_WHITE: tiny_skia::Color = tiny_skia::Color::WHITE;

/// A white-backed raster canvas.
pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    /// New surface filled with canvas white.
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let mut pixmap =
            Pixmap::new(width, height).ok_or(SurfaceError::InvalidDimensions { width, height })?;
        pixmap.fill(CANVAS_WHITE);
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Wipe back to canvas white.
    pub fn clear(&mut self) {
        self.pixmap.fill(CANVAS_WHITE);
    }

    /// Recreate the surface at new dimensions, blank. The caller re-applies
    /// the latest snapshot; segment history is never replayed.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        let mut pixmap =
            Pixmap::new(width, height).ok_or(SurfaceError::InvalidDimensions { width, height })?;
        pixmap.fill(CANVAS_WHITE);
        self.pixmap = pixmap;
        Ok(())
    }

    /// Draw one segment on top of the current content.
    ///
    /// Segments with a non-positive or non-finite width are ignored; local
    /// ones are rejected earlier by brush validation, remote ones are not
    /// worth tearing the canvas down for.
    pub fn apply_segment(&mut self, segment: &StrokeSegment) {
        if !segment.width.is_finite() || segment.width <= 0.0 {
            return;
        }
        match segment.style {
            StrokeStyle::Solid => self.draw_line(segment, None),
            StrokeStyle::Dotted => {
                let width = segment.width as f32;
                self.draw_line(segment, StrokeDash::new(vec![width, width * 2.0], 0.0));
            }
            StrokeStyle::Spray => self.draw_spray(segment),
        }
    }

    /// Replace the whole canvas with a snapshot, scaled to fit.
    ///
    /// Decodes first; on failure the canvas is left untouched. The white
    /// fill before drawing matters because snapshots may carry transparency.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let source = snapshot.to_pixmap()?;
        self.pixmap.fill(CANVAS_WHITE);
        let scale_x = self.pixmap.width() as f32 / source.width() as f32;
        let scale_y = self.pixmap.height() as f32 / source.height() as f32;
        self.pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &PixmapPaint::default(),
            Transform::from_scale(scale_x, scale_y),
            None,
        );
        Ok(())
    }

    /// Capture the current canvas.
    pub fn to_snapshot(&self) -> Result<Snapshot, SnapshotError> {
        Snapshot::from_pixmap(&self.pixmap)
    }

    fn draw_line(&mut self, segment: &StrokeSegment, dash: Option<StrokeDash>) {
        // A zero-length gesture is a tap; render it as a dot.
        if segment.is_dot() {
            self.draw_dot(segment.end, segment.width / 2.0, segment.color);
            return;
        }
        let mut builder = PathBuilder::new();
        builder.move_to(segment.start.x as f32, segment.start.y as f32);
        builder.line_to(segment.end.x as f32, segment.end.y as f32);
        let Some(path) = builder.finish() else {
            return;
        };
        let stroke = Stroke {
            width: segment.width as f32,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            dash,
            ..Stroke::default()
        };
        self.pixmap.stroke_path(
            &path,
            &paint_for(segment.color),
            &stroke,
            Transform::identity(),
            None,
        );
    }

    fn draw_spray(&mut self, segment: &StrokeSegment) {
        let density = (segment.width * 2.0) as usize;
        let radius = segment.width * 3.0;
        let mut rng = rand::rng();
        for _ in 0..density {
            let angle = rng.random_range(0.0..std::f64::consts::TAU);
            let distance = rng.random_range(0.0..radius);
            let dot = Point::new(
                segment.end.x + distance * angle.cos(),
                segment.end.y + distance * angle.sin(),
            );
            self.draw_dot(dot, segment.width / 2.0, segment.color);
        }
    }

    fn draw_dot(&mut self, center: Point, radius: f64, color: Color) {
        let Some(path) = PathBuilder::from_circle(center.x as f32, center.y as f32, radius as f32)
        else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &paint_for(color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

fn paint_for(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, 255);
    paint.anti_alias = true;
    paint
}
