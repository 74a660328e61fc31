//! Transport layer for Roomlink.
//!
//! Two independent pieces live here:
//!
//! - [`TransportSession`] owns the TCP connection to the match-making
//!   server. It writes one frame per message and reads replies whose size
//!   is implied by their type.
//! - [`ConnectivityProber`] is a short-lived local echo endpoint that the
//!   server reaches during a connection test.
//!
//! Neither knows about authentication or room state; that belongs to the
//! client crate.

mod error;
mod probe;
mod session;

pub use error::TransportError;
pub use probe::{ConnectivityProber, PROBE_BUFFER_SIZE};
pub use session::{ReplyOutcome, TransportSession};
