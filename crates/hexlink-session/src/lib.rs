//! Host-side session manager for the hexapod motor board.
//!
//! A [`Session`] turns symbolic commands into sequenced frames, tracks which
//! are awaiting acknowledgment, matches ACK/NAK replies back to them, and
//! forwards INFO and FEEDBACK traffic, all over a link opened on demand.

pub mod config;
pub mod error;
pub mod link;
mod listener;
pub mod message;
pub mod pending;
mod sender;
pub mod session;
pub mod sink;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use link::{LinkControl, LinkState};
pub use message::{Command, CommandKind, Request, Response, SessionEvent};
pub use pending::{PendingRequest, PendingTable};
pub use session::Session;
pub use sink::{raw_channel, RawLogWriter, RawSink};
