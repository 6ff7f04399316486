//! Protocol codec shared by the coordinator and the clock nodes.
pub mod codec;
pub mod messages;

pub use codec::{decode, decode_message, decode_request, decode_response, encode, write_message, Message};
pub use messages::{Request, RequestKind, Response, ResponseStatus};
