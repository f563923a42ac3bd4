//! # canbus-ipc
//!
//! A simulated vehicle CAN bus shared by independent processes over a local
//! pipe (Unix domain socket or Windows named pipe).
//!
//! One process runs the **server** role, a hub that accepts any number of
//! peers and fans every sent frame out to all of them. Other processes run
//! the **client** role, a single endpoint that keeps reconnecting to the
//! server. Both roles expose the same [`CanBus`] contract.
//!
//! ## Architecture
//!
//! - **Frame model**: [`CanFrame`] (id, DLC, payload, UTC timestamp)
//! - **Wire protocol**: little-endian length-prefixed records, at most 8
//!   payload bytes each
//! - **Transport**: accept loop or connect supervision, one read loop and one
//!   writer task per connection, one cancellation token for everything
//!
//! ## Example
//!
//! ```ignore
//! use canbus_ipc::{CanBus, DoorState, DoorStatus, IpcCanBus, Role};
//!
//! #[tokio::main]
//! async fn main() -> canbus_ipc::Result<()> {
//!     let bus = IpcCanBus::builder("vehicle-bus", Role::Client).start()?;
//!     let mut state = bus.subscribe_connection();
//!
//!     while let Ok(connected) = state.recv().await {
//!         if connected {
//!             bus.send(&DoorStatus::new(5, DoorState::Open).to_frame());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod door;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod transport;

mod ipc;

pub use bus::{CanBus, LoopbackBus};
pub use config::{BusConfig, Role};
pub use door::{DoorFrameError, DoorState, DoorStatus};
pub use error::{BusError, Result};
pub use frame::CanFrame;
pub use ipc::{BusBuilder, IpcCanBus};
pub use transport::{FailureHook, LinkState};
