use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, LinkStream};

/// Host-side connector that treats the port name as a Unix socket path.
///
/// Used to drive a session against a device simulator instead of a board.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixSocketConnector;

impl Connector for UnixSocketConnector {
    fn open(&self, port: &str) -> Result<LinkStream> {
        if port.is_empty() {
            return Err(TransportError::NoPort);
        }
        let stream = UnixStream::connect(port).map_err(|e| TransportError::Open {
            port: port.to_string(),
            source: e,
        })?;
        debug!(port, "connected to unix socket link");
        Ok(LinkStream::from_unix(stream, port))
    }

    fn name(&self) -> &'static str {
        "unix"
    }
}

/// Device-side listening socket for simulators.
///
/// The socket file is removed on drop.
pub struct UnixLinkListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixLinkListener {
    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// A stale socket at `path` is removed first; any other file is left alone
    /// and reported as a bind error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(TransportError::Bind {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;
        info!(?path, "simulated device listening");

        Ok(Self { listener, path })
    }

    /// Accept the host's connection (blocking).
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "host connected");
        Ok(LinkStream::from_unix(
            stream,
            self.path.to_string_lossy().into_owned(),
        ))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixLinkListener {
    fn drop(&mut self) {
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket() {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}
