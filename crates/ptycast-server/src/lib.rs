//! ptycast server: registry, broadcast fan-out and the WebSocket session
//! handler around one PTY-attached child process.

pub mod broadcast;
pub mod cli;
pub mod connection;
pub mod context;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session_log;

pub use context::RelayContext;
pub use protocol::{ClientFrame, ServerFrame};
pub use registry::{ClientHandle, Registry};
pub use server::Relay;
pub use session_log::SessionLog;
