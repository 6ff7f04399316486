pub mod api;
pub mod cli;
pub mod coordinator;
pub mod error;
pub mod node;
pub mod protocol;
pub mod settings;
pub mod transport;
pub mod voting;
