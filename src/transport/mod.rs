//! Connection Manager and its TCP plumbing.
//!
//! Nodes dial in, announce themselves with a registration line and then
//! exchange line-framed requests and replies over a persistent connection.
pub mod listener;
pub mod manager;
pub mod pending;
mod session;
pub mod traits;

pub use listener::NodeListener;
pub use manager::{ConnectionManager, SessionInfo};
pub use pending::{PendingReply, PendingSlots};
pub use traits::Broadcaster;
