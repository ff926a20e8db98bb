//! Byte-stream links between the host and the motor-control board.
//!
//! Provides a unified interface over the links a session can run on:
//! - Serial ports (behind the `serial` feature)
//! - Unix domain sockets (Linux/macOS), used by device simulators and tests
//!
//! This is the lowest layer of hexlink. Everything else builds on top of
//! the [`LinkStream`] type and the [`Connector`] trait provided here.

pub mod error;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{Connector, LinkStream};

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialConnector};
#[cfg(unix)]
pub use uds::{UnixLinkListener, UnixSocketConnector};
