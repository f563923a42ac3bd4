//! Door controller - client endpoint publishing door status.
//!
//! This demo:
//! - Joins a bus as a client (start the `gateway` demo first, or later; the
//!   client keeps retrying)
//! - Every 500 ms cycles its door through Closed, Open, Obstructed and sends
//!   the status frame
//! - Exits on Ctrl+C
//!
//! ```text
//! cargo run --example door -- [channel] [door-id]
//! RUST_LOG=canbus_ipc=debug cargo run --example door
//! ```

use std::time::Duration;

use canbus_ipc::{CanBus, DoorState, DoorStatus, IpcCanBus, Role};
use tracing_subscriber::EnvFilter;

const DEFAULT_CHANNEL: &str = "vehicle-bus";
const PUBLISH_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let channel = args.next().unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    let door_id: u8 = match args.next() {
        Some(id) => id.parse()?,
        None => 1,
    };

    let bus = IpcCanBus::builder(channel, Role::Client).start()?;
    tracing::info!("door {} publishing on {:?}", door_id, bus);

    let mut ticker = tokio::time::interval(PUBLISH_INTERVAL);
    let mut state = DoorState::Closed;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                state = state.next();
                let frame = DoorStatus::new(door_id, state).to_frame();
                if bus.is_connected() {
                    tracing::info!("door {} -> {} ({})", door_id, state, frame);
                }
                bus.send(&frame);
            }
        }
    }

    bus.dispose();
    Ok(())
}
