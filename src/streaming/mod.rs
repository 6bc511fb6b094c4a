//! Session transport: wire protocol and the WebSocket endpoint

pub mod protocol;
pub mod session;

pub use protocol::{ClientFrame, OutboundMessage, ServerEvent};
pub use session::{SessionActor, SessionFlow};
