// Types shared by the store and the server: ids, the message model and the
// WebSocket envelopes.

pub mod constants;
pub mod error;
pub mod message;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use message::{DeletionSet, Message, ReactionMap};
pub use protocol::{InboundEvent, OutboundEvent};
pub use types::{CallType, MessageId, MessageKind, SessionId, UserId};
