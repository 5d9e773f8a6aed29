use std::sync::Arc;

use pgsession_core::PhysicalConnection;
use pgsession_events::NotificationRouter;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Background task feeding a connection's notifications into a router.
///
/// Installed when a session connects, stopped when it releases the
/// connection.
pub(crate) struct Forwarder {
    cancel: CancellationToken,
}

impl Forwarder {
    pub(crate) fn spawn(connection: Arc<dyn PhysicalConnection>, router: NotificationRouter) -> Self {
        // Subscribe before spawning so nothing sent after connect() returns is missed.
        let mut notifications = connection.notifications();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    received = notifications.recv() => match received {
                        Ok(notification) => {
                            tracing::trace!(channel = %notification.channel, "notification received");
                            // The UNLISTEN is queued before the one-shot handler runs, so it
                            // precedes anything the handler's owner issues afterwards.
                            router.route_with(&notification, |channel| {
                                connection.submit(format!("UNLISTEN {}", channel.quoted()));
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "notification forwarder lagged, notifications dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::trace!("notification forwarder stopped");
        });

        Self { cancel }
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }
}
