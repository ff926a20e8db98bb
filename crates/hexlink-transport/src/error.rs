use std::path::PathBuf;

/// Errors that can occur while opening or using a link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the named port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// Failed to bind a simulator socket.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming simulator connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No port name was given.
    #[error("no port selected")]
    NoPort,

    /// The requested link kind is not compiled into this build.
    #[error("unsupported link: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
