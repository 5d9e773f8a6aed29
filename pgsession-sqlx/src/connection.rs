use async_trait::async_trait;
use pgsession_core::{BoxError, Notification, PhysicalConnection, QueryOutput};
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::Executor;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::convert::{bind_params, row_to_json, transaction_effect};
use crate::error::BackendError;

const NOTIFICATION_BUFFER: usize = 1024;

type Reply = oneshot::Sender<Result<QueryOutput, BackendError>>;

struct Command {
    sql: String,
    params: Vec<Value>,
    /// `None` for submitted statements nobody waits on.
    reply: Option<Reply>,
}

/// One pooled connection, owned by a worker task.
///
/// The worker runs statements one at a time in arrival order and, between
/// statements, forwards server notifications to every subscriber. Stopping
/// the worker drops the underlying `PgListener`, which runs `UNLISTEN *` and
/// hands the connection back to the `PgPool`.
///
/// A lost connection stops the worker for good. `PgListener` would quietly
/// reconnect on the next statement, dropping the open transaction and every
/// `LISTEN` on the way, so pending and later statements fail with
/// [`BackendError::ConnectionClosed`] instead.
pub(crate) struct SqlxConnection {
    commands: mpsc::UnboundedSender<Command>,
    notifications: broadcast::Sender<Notification>,
}

impl SqlxConnection {
    /// Start the worker for `listener`. Cancelling `stop` shuts it down.
    pub(crate) fn spawn(listener: PgListener, stop: CancellationToken) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        tokio::spawn(run(listener, receiver, notifications.clone(), stop));
        Self { commands, notifications }
    }
}

#[async_trait]
impl PhysicalConnection for SqlxConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, BoxError> {
        let (reply, response) = oneshot::channel();
        let command = Command {
            sql: sql.to_string(),
            params: params.to_vec(),
            reply: Some(reply),
        };
        self.commands
            .send(command)
            .map_err(|_| BackendError::ConnectionClosed)?;
        let output = response.await.map_err(|_| BackendError::ConnectionClosed)??;
        Ok(output)
    }

    fn submit(&self, sql: String) {
        let command = Command {
            sql,
            params: Vec::new(),
            reply: None,
        };
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            tracing::warn!(sql = %command.sql, "connection closed, queued statement dropped");
        }
    }

    fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }
}

async fn run(
    mut listener: PgListener,
    mut commands: mpsc::UnboundedReceiver<Command>,
    notifications: broadcast::Sender<Notification>,
    stop: CancellationToken,
) {
    let mut in_transaction = false;
    let mut lost = false;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            command = commands.recv() => {
                let Some(Command { sql, params, reply }) = command else { break };
                let result = execute(&mut listener, &sql, &params).await;
                match &result {
                    Ok(_) => {
                        if let Some(open) = transaction_effect(&sql) {
                            in_transaction = open;
                        }
                    }
                    Err(err) => lost = err.is_connection_lost(),
                }
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            tracing::error!(error = %err, sql = %sql, "queued statement failed");
                        }
                    }
                }
                if lost {
                    tracing::error!("connection lost, closing");
                    break;
                }
            }
            received = listener.try_recv() => match received {
                Ok(Some(notification)) => {
                    let _ = notifications.send(Notification {
                        process_id: notification.process_id(),
                        channel: notification.channel().to_string(),
                        payload: notification.payload().to_string(),
                    });
                }
                Ok(None) => {
                    tracing::error!("connection lost, closing");
                    lost = true;
                    break;
                }
                Err(err) => {
                    tracing::error!(error = %err, "listener failed, closing connection");
                    lost = true;
                    break;
                }
            },
        }
    }

    // Queued statements fail with ConnectionClosed, as do later ones.
    drop(commands);

    if in_transaction && !lost {
        tracing::warn!("connection released inside a transaction, rolling back");
        if let Err(err) = (&mut listener).execute(sqlx::raw_sql("ROLLBACK")).await {
            tracing::error!(error = %err, "rollback on release failed");
        }
    }
    tracing::trace!("connection worker stopped");
}

async fn execute(listener: &mut PgListener, sql: &str, params: &[Value]) -> Result<QueryOutput, BackendError> {
    let rows = if params.is_empty() {
        (&mut *listener).fetch_all(sqlx::raw_sql(sql)).await?
    } else {
        (&mut *listener).fetch_all(bind_params(sqlx::query(sql), params)).await?
    };
    Ok(QueryOutput::from_rows(rows.iter().map(row_to_json).collect()))
}
