//! Clock source nodes: identity, virtual clock, and the client loop that
//! answers the coordinator.
pub mod clock;
pub mod node_id;
pub mod source;

pub use clock::{wall_clock_millis, VirtualClock};
pub use node_id::{configured_ids, NodeId};
pub use source::{ClockSource, Disconnect};
