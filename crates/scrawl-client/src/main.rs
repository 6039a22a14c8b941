//! Headless Scrawl client.
//!
//! Joins a board, mirrors it locally, and logs roster and sync activity.
//! Useful for smoke-testing a relay and for keeping an up-to-date PNG
//! mirror of a board on disk. With `--doodle` it also draws, which makes
//! it a handy second participant when testing by hand.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;

use scrawl_core::kurbo::Point;
use scrawl_core::protocol::{ServerMessage, SyncEvent, DEFAULT_BOARD_ID};
use scrawl_core::{BoardSession, Brush, ConnectionManager, Participant, BRUSH_PALETTE, BRUSH_SIZES};

#[derive(Parser, Debug)]
#[command(name = "scrawl-client")]
#[command(about = "Headless client for Scrawl boards")]
#[command(version)]
struct Cli {
    /// WebSocket endpoint of the relay server
    #[arg(long, default_value = "ws://127.0.0.1:3030/ws")]
    url: String,

    /// Board to join
    #[arg(long, default_value = DEFAULT_BOARD_ID)]
    board: String,

    /// Display name announced to other participants
    #[arg(long, default_value = "observer")]
    name: String,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Draw a random stroke every N seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    doodle: u64,

    /// Write the canvas to this PNG after every authoritative sync
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    log::info!("Starting Scrawl client");

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let participant = Participant::with_name(&cli.name);
    log::info!(
        "Joining {} as {} ({})",
        cli.board,
        participant.display_name,
        participant.id
    );

    let mut session = BoardSession::new(&cli.board, participant, cli.width, cli.height)
        .map_err(|e| e.to_string())?;
    let mut connection = ConnectionManager::new();
    connection.connect(&cli.url)?;

    let doodle_every = (cli.doodle > 0).then(|| Duration::from_secs(cli.doodle));
    let mut next_doodle = Instant::now();

    loop {
        let mut export_due = false;
        for event in connection.poll_events() {
            match &event {
                SyncEvent::Message(ServerMessage::RosterUpdate { participants }) => {
                    let names: Vec<&str> =
                        participants.iter().map(|p| p.display_name.as_str()).collect();
                    log::info!("Participants: {}", names.join(", "));
                }
                SyncEvent::Message(ServerMessage::StrokeSegment(segment)) => {
                    log::debug!("Segment from {}", segment.author_id);
                }
                SyncEvent::Message(ServerMessage::SaveAcknowledged { timestamp }) => {
                    log::info!("Board saved at {}", timestamp);
                }
                SyncEvent::Message(ServerMessage::FullSnapshot { .. })
                | SyncEvent::Message(ServerMessage::BoardLoaded { snapshot: Some(_) }) => {
                    export_due = true;
                }
                _ => {}
            }
            session.handle_event(event);
        }

        if let Some(every) = doodle_every {
            let now = Instant::now();
            if session.is_connected() && now >= next_doodle {
                draw_doodle(&mut session);
                next_doodle = now + every;
            }
        }

        session.tick(Instant::now());
        for msg in session.take_outgoing() {
            if let Err(e) = connection.send_message(&msg) {
                log::warn!("Send failed: {}", e);
            }
        }

        if export_due {
            if let Some(ref path) = cli.export {
                export_canvas(&session, path);
            }
        }

        thread::sleep(Duration::from_millis(25));
    }
}

/// Draw one random stroke through the normal gesture path.
fn draw_doodle(session: &mut BoardSession) {
    let mut rng = rand::rng();
    let w = session.surface().width() as f64;
    let h = session.surface().height() as f64;
    let start = Point::new(rng.random_range(0.0..w), rng.random_range(0.0..h));
    let end = Point::new(rng.random_range(0.0..w), rng.random_range(0.0..h));

    session.set_brush(Brush {
        color: BRUSH_PALETTE[rng.random_range(0..BRUSH_PALETTE.len())],
        width: BRUSH_SIZES[rng.random_range(0..BRUSH_SIZES.len())],
        ..Brush::default()
    });

    if session.pointer_down(start).is_ok() {
        // A few interpolated points so the stroke has some length.
        for i in 1..=8 {
            let t = i as f64 / 8.0;
            session.pointer_move(Point::new(
                start.x + (end.x - start.x) * t,
                start.y + (end.y - start.y) * t,
            ));
        }
        session.pointer_up(Instant::now());
        log::info!("Doodled from {:?} to {:?}", start, end);
    }
}

fn export_canvas(session: &BoardSession, path: &Path) {
    match session.surface().to_snapshot() {
        Ok(snapshot) => {
            if let Err(e) = std::fs::write(path, snapshot.png_bytes()) {
                log::warn!("Could not write {}: {}", path.display(), e);
            } else {
                log::info!("Exported board to {}", path.display());
            }
        }
        Err(e) => log::warn!("Could not encode canvas: {}", e),
    }
}
