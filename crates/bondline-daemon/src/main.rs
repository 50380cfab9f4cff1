//! bondlined: replays accounting commands against the Bondline engine.
//!
//! Commands are read from a JSON script and applied in order. Every emitted
//! accounting event is broadcast on the event bus and printed to stdout as
//! one JSON object per line. Logs go to stderr.

mod config;
mod events;
mod replay;

use std::path::PathBuf;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use bondline_types::events::EventRecord;

use crate::config::DaemonConfig;
use crate::events::{EventBus, EventFilter};
use crate::replay::{ReplayCommand, Replayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let config = DaemonConfig::load(&data_dir)?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("bondline={}", config.logging.log_level).parse()?),
        )
        .init();

    info!(data_dir = ?data_dir, "Bondline daemon starting");

    // 2. Read the script; a path argument overrides the configured one
    let script_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.script_path(&data_dir));
    let commands = replay::load_script(&script_path)?;
    info!(script = ?script_path, commands = commands.len(), "replay script loaded");

    // 3. Build the engine
    let mut replayer = Replayer::new(&config.engine)?;

    // 4. Create event bus and the stdout printer
    let event_bus = EventBus::new(config.replay.event_buffer);
    let printer = tokio::spawn(print_events(
        event_bus.subscribe(),
        config.replay.output.clone(),
    ));

    // 5. Replay until done or interrupted
    let stop_on_error = config.replay.stop_on_error;
    let outcome = tokio::select! {
        result = run(&mut replayer, &event_bus, commands, stop_on_error) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
    };

    // Flush events left by an interrupted command
    for record in replayer.drain_events() {
        event_bus.emit(record);
    }
    let emitted = event_bus.emitted();
    drop(event_bus);
    if let Err(e) = printer.await {
        error!("Event printer failed: {}", e);
    }

    info!(
        emitted,
        round = replayer.manager().current_round(),
        "Daemon stopped"
    );
    outcome
}

async fn run(
    replayer: &mut Replayer,
    event_bus: &EventBus,
    commands: Vec<ReplayCommand>,
    stop_on_error: bool,
) -> anyhow::Result<()> {
    let total = commands.len();
    let mut rejected = 0usize;
    for (index, command) in commands.into_iter().enumerate() {
        match replayer.apply(command) {
            Ok(Some(report)) => println!("{}", serde_json::to_string(&report)?),
            Ok(None) => {}
            Err(e) if stop_on_error => {
                error!(index, "command rejected: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                rejected += 1;
                warn!(index, "command rejected: {}", e);
            }
        }
        for record in replayer.drain_events() {
            event_bus.emit(record);
        }
        tokio::task::yield_now().await;
    }
    info!(total, rejected, "replay finished");
    Ok(())
}

async fn print_events(mut rx: broadcast::Receiver<EventRecord>, filter: EventFilter) {
    loop {
        match rx.recv().await {
            Ok(record) if filter.matches(&record) => match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode event {}: {}", record.sequence, e),
            },
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
