//! Platform-specific pipe/socket implementation.
//!
//! - Unix: Unix Domain Socket (`{socket_dir}/canbus-{channel}.sock`)
//! - Windows: Named Pipe (`\\.\pipe\{channel}`)
//!
//! # Example
//!
//! ```ignore
//! use canbus_ipc::transport::{channel_path, PipeListener, PipeStream};
//!
//! let path = channel_path("vehicle", None)?;
//! let mut listener = PipeListener::bind(&path)?;
//! let client = PipeStream::connect(&path).await?;
//! let server_side = listener.accept().await?;
//! ```

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{BusError, Result};

/// Socket file name prefix on Unix.
pub const SOCKET_PREFIX: &str = "canbus-";

/// `sun_path` is 104 bytes on macOS and 108 on Linux; use the smaller.
pub const MAX_SOCKET_PATH: usize = 104;

/// Resolve a channel name to the local endpoint path.
///
/// The name is used verbatim; surrounding whitespace is significant.
/// `socket_dir` is only used on Unix; it defaults to the OS temp dir.
pub fn channel_path(channel: &str, socket_dir: Option<&Path>) -> Result<PathBuf> {
    if channel.trim().is_empty() {
        return Err(BusError::InvalidChannel("channel name is required".to_string()));
    }
    if channel.contains(['/', '\\']) || channel.contains('\0') {
        return Err(BusError::InvalidChannel(format!(
            "channel name '{}' must not contain path separators",
            channel
        )));
    }

    #[cfg(unix)]
    {
        let dir = socket_dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let path = dir.join(format!("{}{}.sock", SOCKET_PREFIX, channel));
        let path_len = path.as_os_str().len();
        if path_len >= MAX_SOCKET_PATH {
            return Err(BusError::InvalidChannel(format!(
                "socket path too long ({} bytes, max {}): {}",
                path_len,
                MAX_SOCKET_PATH - 1,
                path.display()
            )));
        }
        Ok(path)
    }

    #[cfg(windows)]
    {
        let _ = socket_dir;
        Ok(PathBuf::from(format!(r"\\.\pipe\{}", channel)))
    }
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use tokio::net::{UnixListener, UnixStream};

    use std::os::unix::fs::MetadataExt;

    /// Unix Domain Socket listener.
    #[derive(Debug)]
    pub struct PipeListener {
        listener: UnixListener,
        path: PathBuf,
        /// (device, inode) of the socket file this listener created.
        identity: Option<(u64, u64)>,
    }

    /// Unix Domain Socket stream (connected).
    #[derive(Debug)]
    pub struct PipeStream {
        stream: UnixStream,
    }

    impl PipeListener {
        /// Bind to a Unix socket path.
        ///
        /// Removes any stale socket file at the path before binding. Must be
        /// called from within a tokio runtime.
        pub fn bind(path: &Path) -> Result<Self> {
            if path.exists() {
                std::fs::remove_file(path)?;
            }

            let listener = UnixListener::bind(path)?;
            let identity = std::fs::metadata(path).ok().map(|m| (m.dev(), m.ino()));

            Ok(Self {
                listener,
                path: path.to_path_buf(),
                identity,
            })
        }

        /// Wait for the next peer.
        pub async fn accept(&mut self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(PipeStream { stream })
        }

        /// Get the socket path.
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            // Leave the file alone if a newer listener has replaced it
            let current = std::fs::metadata(&self.path).ok().map(|m| (m.dev(), m.ino()));
            if current.is_some() && current == self.identity {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    impl PipeStream {
        /// Connect to a listening socket.
        pub async fn connect(path: &Path) -> Result<Self> {
            let stream = UnixStream::connect(path).await?;
            Ok(Self { stream })
        }

        /// Split into independently owned read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            self.stream.into_split()
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    /// Windows Named Pipe listener.
    ///
    /// Always holds one unconnected pipe instance so clients never see the
    /// name disappear between accepts.
    #[derive(Debug)]
    pub struct PipeListener {
        pending: NamedPipeServer,
        path: PathBuf,
    }

    /// Windows Named Pipe stream, either end.
    #[derive(Debug)]
    pub enum PipeStream {
        /// Accepted by a listener.
        Server(NamedPipeServer),
        /// Opened by a client.
        Client(NamedPipeClient),
    }

    impl PipeListener {
        /// Create the first pipe instance.
        pub fn bind(path: &Path) -> Result<Self> {
            let pending = ServerOptions::new()
                .first_pipe_instance(true)
                .create(path)?;
            Ok(Self {
                pending,
                path: path.to_path_buf(),
            })
        }

        /// Wait for the next peer, then queue a fresh instance for the one after.
        pub async fn accept(&mut self) -> Result<PipeStream> {
            self.pending.connect().await?;
            let next = ServerOptions::new().create(&self.path)?;
            let connected = std::mem::replace(&mut self.pending, next);
            Ok(PipeStream::Server(connected))
        }

        /// Get the pipe path.
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl PipeStream {
        /// Open the named pipe.
        pub async fn connect(path: &Path) -> Result<Self> {
            let client = ClientOptions::new().open(path)?;
            Ok(PipeStream::Client(client))
        }

        /// Split into read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            tokio::io::split(self)
        }
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_read(cx, buf),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_read(cx, buf),
            }
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_write(cx, buf),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_write(cx, buf),
            }
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_flush(cx),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_flush(cx),
            }
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_shutdown(cx),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_shutdown(cx),
            }
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{PipeListener, PipeStream};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_path_rejects_blank() {
        assert!(matches!(
            channel_path("  ", None),
            Err(BusError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_channel_path_rejects_separators() {
        assert!(channel_path("a/b", None).is_err());
        assert!(channel_path(r"a\b", None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_channel_path_unix_format() {
        let path = channel_path("vehicle", Some(Path::new("/tmp"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/canbus-vehicle.sock"));
    }

    #[test]
    fn test_channel_path_keeps_whitespace() {
        let dir = Path::new("/tmp");
        let padded = channel_path(" bus", Some(dir)).unwrap();
        let plain = channel_path("bus", Some(dir)).unwrap();
        assert_ne!(padded, plain);
    }

    #[cfg(unix)]
    #[test]
    fn test_channel_path_unix_too_long() {
        let name = "x".repeat(MAX_SOCKET_PATH);
        assert!(matches!(
            channel_path(&name, Some(Path::new("/tmp"))),
            Err(BusError::InvalidChannel(_))
        ));
    }

    #[cfg(windows)]
    #[test]
    fn test_channel_path_windows_format() {
        let path = channel_path("vehicle", None).unwrap();
        assert_eq!(path, PathBuf::from(r"\\.\pipe\vehicle"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bind_connect_accept() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let dir = tempfile::tempdir().unwrap();
        let path = channel_path("pipe-test", Some(dir.path())).unwrap();
        let mut listener = PipeListener::bind(&path).unwrap();
        assert!(path.exists());

        let client = PipeStream::connect(&path).await.unwrap();
        let server = listener.accept().await.unwrap();

        let (_client_read, mut client_write) = client.into_split();
        let (mut server_read, _server_write) = server.into_split();

        client_write.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(listener);
        assert!(!path.exists(), "socket file removed on drop");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = channel_path("stale", Some(dir.path())).unwrap();
        std::fs::write(&path, b"").unwrap();

        let listener = PipeListener::bind(&path).unwrap();
        assert_eq!(listener.path(), path.as_path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_drop_keeps_replacement_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = channel_path("rebound", Some(dir.path())).unwrap();
        let old = PipeListener::bind(&path).unwrap();
        let new = PipeListener::bind(&path).unwrap();

        drop(old);
        assert!(path.exists(), "old listener must not unlink the new socket");
        assert!(PipeStream::connect(&path).await.is_ok());

        drop(new);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_without_listener_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = channel_path("nobody", Some(dir.path())).unwrap();
        assert!(PipeStream::connect(&path).await.is_err());
    }
}
