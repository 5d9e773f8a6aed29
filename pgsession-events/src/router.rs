use std::sync::Arc;

use pgsession_core::Notification;
use serde_json::{json, Value};

use crate::channel::{ChannelName, Identifier};
use crate::payload::decode_payload;
use crate::registry::ListenerRegistry;

/// Demultiplexes raw connection notifications onto a session's listeners.
///
/// Every notification is first forwarded untouched to the
/// [`$notification`](crate::NOTIFICATION_META) meta channel, then decoded
/// with [`decode_payload`] and dispatched to the listeners of its channel.
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    registry: Arc<ListenerRegistry>,
}

impl NotificationRouter {
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Route one notification. Returns the number of channel listeners invoked
    /// (meta listeners not included).
    pub fn route(&self, notification: &Notification) -> usize {
        self.route_with(notification, |_| {})
    }

    /// Route one notification, calling `before_once` with the channel right
    /// before each one-shot listener fires.
    pub fn route_with(
        &self,
        notification: &Notification,
        mut before_once: impl FnMut(&Identifier),
    ) -> usize {
        self.registry
            .dispatch(&ChannelName::notification_meta(), &[raw_event(notification)]);

        let channel = match Identifier::parse(&notification.channel) {
            Ok(ident) => ChannelName::Channel(ident),
            Err(_) => {
                tracing::debug!(
                    channel = %notification.channel,
                    "notification on a channel outside the identifier pattern, only forwarded to meta listeners"
                );
                return 0;
            }
        };

        let args = decode_payload(&notification.payload);
        self.registry.dispatch_with(&channel, &args, |channel| {
            if let Some(ident) = channel.identifier() {
                before_once(ident);
            }
        })
    }
}

fn raw_event(notification: &Notification) -> Value {
    json!({
        "name": "notification",
        "processId": notification.process_id,
        "channel": notification.channel,
        "payload": notification.payload,
    })
}
