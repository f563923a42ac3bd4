//! Gateway monitor - server endpoint logging every frame on the bus.
//!
//! This demo:
//! - Hosts the bus as the server role
//! - Logs connection changes and every received frame
//! - Decodes door status frames (ids 0x200..=0x2FF)
//! - Exits on Ctrl+C
//!
//! ```text
//! cargo run --example gateway -- [channel]
//! ```

use canbus_ipc::door::DOOR_BASE_ID;
use canbus_ipc::{CanBus, DoorStatus, IpcCanBus, Role};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const DEFAULT_CHANNEL: &str = "vehicle-bus";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let channel = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

    let bus = IpcCanBus::builder(channel, Role::Server)
        .on_failure(|message, error| tracing::debug!("{}: {}", message, error))
        .start()?;
    let mut frames = bus.subscribe_frames();
    let mut connection = bus.subscribe_connection();
    tracing::info!("gateway listening on {}", bus.path().display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = connection.recv() => match changed {
                Ok(true) => tracing::info!("first peer connected"),
                Ok(false) => tracing::info!("no peers connected"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            received = frames.recv() => match received {
                Ok(frame) => {
                    if (DOOR_BASE_ID..=DOOR_BASE_ID + 0xFF).contains(&frame.id) {
                        match DoorStatus::parse(&frame) {
                            Ok(status) => tracing::info!("door {} is {}", status.door_id, status.state),
                            Err(e) => tracing::warn!("bad door frame {}: {}", frame, e),
                        }
                    } else {
                        tracing::info!("{}", frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!("monitor lagged, skipped {} frames", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    bus.dispose();
    Ok(())
}
