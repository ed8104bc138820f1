//! Network-facing layer: per-IP admission control, bandwidth accounting,
//! per-connection session state machines, and the session registry.
//!
//! Sessions run on the tokio runtime's network workers. They own their
//! socket halves and read buffers; everything they learn is handed to a
//! [`SessionHandler`] which bridges into the tick thread via the server's
//! action queue. Game state is never touched from here.

mod admission;
mod bandwidth;
mod registry;
mod session;

pub use crate::admission::{Admission, MAX_CONNECTIONS_PER_IP, MAX_FAILURES_BEFORE_BAN};
pub use crate::bandwidth::{BandwidthMonitor, BandwidthSnapshot};
pub use crate::registry::{shared_frame, SessionRegistry};
pub use crate::session::{
    run_session, run_writer, ClientSession, SessionHandler, SessionState, HANDSHAKE_TIMEOUT,
    MAX_MISSED_PINGS, PING_INTERVAL,
};
