//! Transport module - pipe handling and the two role engines.
//!
//! Provides abstraction over:
//! - Unix Domain Sockets (Linux/macOS)
//! - Named Pipes (Windows)
//!
//! On top of the pipe layer sit the server engine (accept loop plus
//! live-connection set) and the client engine (connect supervision), both
//! sharing one state core and one writer task per connection.

mod core;
mod dialer;
mod listener;
mod pipe;
mod writer;

pub use self::core::{FailureHook, LinkState};
pub use pipe::{channel_path, PipeListener, PipeStream, MAX_SOCKET_PATH, SOCKET_PREFIX};
pub use writer::{spawn_writer_task, WriterHandle};

pub(crate) use self::core::BusCore;
pub(crate) use dialer::Dialer;
pub(crate) use listener::Listener;
