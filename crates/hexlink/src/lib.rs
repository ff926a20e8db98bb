//! Host-side link to the hexapod motor-control board.
//!
//! hexlink frames commands for the board, parses its byte stream back into
//! messages, and manages a session that correlates every command with the
//! board's ACK or NAK.
//!
//! # Crate Structure
//!
//! - [`transport`]: Links to the board (serial ports, Unix sockets for simulators)
//! - [`frame`]: Wire codec, payload decoders and the resynchronizing stream parser
//! - [`session`]: Sender/listener session manager (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use hexlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hexlink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use hexlink_session::*;
}
