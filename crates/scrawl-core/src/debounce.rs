//! Save debouncing.
//!
//! A save ships the entire canvas, so individual edits must not each
//! trigger one. Save requests restart a fixed window and replace the
//! pending payload; when the window elapses only the newest snapshot of
//! the burst goes out.
//!
//! The debouncer never looks at the clock itself. Callers pass `Instant`s
//! in, which keeps the window deterministic under test.

use std::time::{Duration, Instant};

use crate::snapshot::Snapshot;

/// Default debounce window in milliseconds.
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;

struct Pending {
    snapshot: Snapshot,
    since: Instant,
}

/// Rate limiter between edits and `save-board` messages.
pub struct SaveDebouncer {
    window: Duration,
    pending: Option<Pending>,
    /// Snapshot whose window elapsed while offline, kept for
    /// retransmission after reconnect.
    parked: Option<Snapshot>,
    in_flight: bool,
    last_saved_at: Option<i64>,
}

impl SaveDebouncer {
    pub fn new() -> Self {
        Self::with_window(Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            parked: None,
            in_flight: false,
            last_saved_at: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Queue `snapshot` for saving and restart the window.
    pub fn request_save(&mut self, snapshot: Snapshot, now: Instant) {
        self.pending = Some(Pending { snapshot, since: now });
    }

    /// Drive the window. When it elapses while connected, returns the
    /// snapshot to transmit and marks a save in flight. When it elapses
    /// offline the snapshot is parked instead; nothing is ever silently
    /// dropped here.
    pub fn poll(&mut self, now: Instant, connected: bool) -> Option<Snapshot> {
        let elapsed = self
            .pending
            .as_ref()
            .is_some_and(|p| now.duration_since(p.since) >= self.window);
        if !elapsed {
            return None;
        }
        let pending = self.pending.take()?;
        if connected {
            self.in_flight = true;
            // Anything still parked predates this snapshot and must not
            // follow it onto the wire.
            if self.parked.take().is_some() {
                log::debug!("parked save outdated by a newer one");
            }
            Some(pending.snapshot)
        } else {
            log::debug!("save window elapsed while offline, parking snapshot");
            self.parked = Some(pending.snapshot);
            None
        }
    }

    /// Take the parked snapshot for retransmission. Marks a save in flight.
    pub fn take_parked(&mut self) -> Option<Snapshot> {
        let snapshot = self.parked.take()?;
        self.in_flight = true;
        Some(snapshot)
    }

    pub fn has_parked(&self) -> bool {
        self.parked.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Server truth replaced the canvas; whatever is queued or parked
    /// describes pixels that no longer exist.
    pub fn supersede(&mut self) {
        if self.pending.take().is_some() || self.parked.take().is_some() {
            log::debug!("outstanding save superseded by server state");
        }
    }

    /// Handle `save-acknowledged`. `timestamp` is ms since the epoch.
    pub fn acknowledge(&mut self, timestamp: i64) {
        self.in_flight = false;
        self.last_saved_at = Some(timestamp);
    }

    /// True from the moment a save is handed out until it is acknowledged.
    pub fn is_saving(&self) -> bool {
        self.in_flight
    }

    /// Timestamp from the most recent acknowledgment.
    pub fn last_saved_at(&self) -> Option<i64> {
        self.last_saved_at
    }
}

impl Default for SaveDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tag: u8) -> Snapshot {
        Snapshot::from_png_bytes(vec![tag])
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_burst_collapses_to_last_snapshot() {
        let mut debouncer = SaveDebouncer::new();
        let t0 = Instant::now();
        debouncer.request_save(snap(1), t0);
        debouncer.request_save(snap(2), t0 + ms(300));
        debouncer.request_save(snap(3), t0 + ms(600));

        // Window restarted at each request.
        assert_eq!(debouncer.poll(t0 + ms(1500), true), None);
        assert_eq!(debouncer.poll(t0 + ms(1600), true), Some(snap(3)));
        assert!(debouncer.is_saving());

        // One burst, one save.
        assert_eq!(debouncer.poll(t0 + ms(5000), true), None);
    }

    #[test]
    fn test_window_boundary() {
        let mut debouncer = SaveDebouncer::new();
        let t0 = Instant::now();
        debouncer.request_save(snap(1), t0);
        assert_eq!(debouncer.poll(t0 + ms(999), true), None);
        assert_eq!(debouncer.poll(t0 + ms(1000), true), Some(snap(1)));
    }

    #[test]
    fn test_offline_elapse_parks_instead_of_dropping() {
        let mut debouncer = SaveDebouncer::new();
        let t0 = Instant::now();
        debouncer.request_save(snap(7), t0);

        assert_eq!(debouncer.poll(t0 + ms(1200), false), None);
        assert!(!debouncer.is_saving());
        assert!(debouncer.has_parked());
        assert!(!debouncer.has_pending());

        assert_eq!(debouncer.take_parked(), Some(snap(7)));
        assert!(debouncer.is_saving());
        assert!(!debouncer.has_parked());
    }

    #[test]
    fn test_supersede_discards_pending_and_parked() {
        let mut debouncer = SaveDebouncer::new();
        let t0 = Instant::now();
        debouncer.request_save(snap(1), t0);
        debouncer.poll(t0 + ms(1100), false);
        debouncer.request_save(snap(2), t0 + ms(1200));
        assert!(debouncer.has_parked());
        assert!(debouncer.has_pending());

        debouncer.supersede();
        assert!(!debouncer.has_parked());
        assert!(!debouncer.has_pending());
        assert_eq!(debouncer.poll(t0 + ms(9999), true), None);
    }

    #[test]
    fn test_acknowledge_clears_in_flight() {
        let mut debouncer = SaveDebouncer::new();
        let t0 = Instant::now();
        debouncer.request_save(snap(1), t0);
        debouncer.poll(t0 + ms(1000), true);
        assert!(debouncer.is_saving());

        debouncer.acknowledge(1_700_000_000_000);
        assert!(!debouncer.is_saving());
        assert_eq!(debouncer.last_saved_at(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_custom_window() {
        let mut debouncer = SaveDebouncer::with_window(ms(50));
        let t0 = Instant::now();
        debouncer.request_save(snap(1), t0);
        assert_eq!(debouncer.poll(t0 + ms(49), true), None);
        assert_eq!(debouncer.poll(t0 + ms(50), true), Some(snap(1)));
    }

    #[test]
    fn test_fresh_save_drops_stale_parked() {
        let mut debouncer = SaveDebouncer::new();
        let t0 = Instant::now();

        // First save elapses offline and is parked.
        debouncer.request_save(snap(1), t0);
        assert_eq!(debouncer.poll(t0 + ms(1000), false), None);
        assert!(debouncer.has_parked());

        // A newer save goes out; the parked one must not follow it.
        debouncer.request_save(snap(2), t0 + ms(1100));
        assert_eq!(debouncer.poll(t0 + ms(2100), true), Some(snap(2)));
        assert!(!debouncer.has_parked());
        assert_eq!(debouncer.take_parked(), None);
    }
}
