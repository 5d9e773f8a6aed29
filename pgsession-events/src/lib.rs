//! LISTEN/NOTIFY plumbing shared by every session.
//!
//! - [`channel`]: validated channel identifiers and SQL quoting
//! - [`payload`]: the payload convention (plain text vs JSON-array arguments)
//! - [`registry`]: per-session listener bookkeeping
//! - [`router`]: demultiplexing raw notifications onto listeners

pub mod channel;
pub mod payload;
pub mod registry;
pub mod router;

pub use channel::{quote_literal, ChannelName, Identifier, NOTIFICATION_META};
pub use payload::{decode_payload, encode_args};
pub use registry::{Handler, ListenerId, ListenerRegistry};
pub use router::NotificationRouter;

pub mod prelude {
    //! Re-exports of the most commonly used event types.
    pub use crate::{ChannelName, Identifier, ListenerId, ListenerRegistry, NotificationRouter};
}
