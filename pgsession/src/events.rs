//! Event-subscription facade: listeners and emitters over `LISTEN` / `NOTIFY`.
//!
//! Channel names starting with `$` are local meta channels. They never reach
//! the server: registering, removing and emitting on them only touches the
//! session's listener registry. `$notification` receives every raw
//! notification before it is decoded.
//!
//! Every registration on a server channel issues `LISTEN` and every removal
//! issues `UNLISTEN`, without counting how many listeners share the channel.
//! Removing one of two listeners on a channel therefore stops server delivery
//! for both.

use pgsession_core::{SessionError, SessionResult};
use pgsession_events::{encode_args, quote_literal, ChannelName, Identifier, ListenerId};
use serde_json::Value;

use crate::session::Session;

impl Session {
    /// Issue `LISTEN` for `channel`.
    pub async fn listen(&mut self, channel: &str) -> SessionResult<()> {
        let ident = Identifier::parse(channel)?;
        self.listen_identifier(&ident).await
    }

    /// Issue `UNLISTEN` for `channel`.
    pub async fn unlisten(&mut self, channel: &str) -> SessionResult<()> {
        let ident = Identifier::parse(channel)?;
        self.unlisten_identifier(&ident).await
    }

    /// Issue `NOTIFY` for `channel`, with `payload` when given.
    pub async fn notify(&mut self, channel: &str, payload: Option<&str>) -> SessionResult<()> {
        let ident = Identifier::parse(channel)?;
        self.notify_identifier(&ident, payload).await
    }

    async fn listen_identifier(&mut self, ident: &Identifier) -> SessionResult<()> {
        self.execute(&format!("LISTEN {}", ident.quoted()), &[]).await?;
        Ok(())
    }

    async fn unlisten_identifier(&mut self, ident: &Identifier) -> SessionResult<()> {
        self.execute(&format!("UNLISTEN {}", ident.quoted()), &[]).await?;
        Ok(())
    }

    async fn notify_identifier(&mut self, ident: &Identifier, payload: Option<&str>) -> SessionResult<()> {
        let sql = match payload {
            Some(payload) => format!("NOTIFY {}, {}", ident.quoted(), quote_literal(payload)),
            None => format!("NOTIFY {}", ident.quoted()),
        };
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Register `handler` on a local meta channel. A leading `$` is optional.
    pub fn subscribe_meta<F>(&self, name: &str, handler: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let name = name.strip_prefix('$').unwrap_or(name);
        self.listeners().add(ChannelName::meta(name), handler)
    }

    /// Register `handler` on a server channel and issue `LISTEN`.
    ///
    /// If `LISTEN` fails the registration is undone before the error is returned.
    pub async fn subscribe_channel<F>(&mut self, channel: &str, handler: F) -> SessionResult<ListenerId>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let ident = Identifier::parse(channel)?;
        self.register(ChannelName::Channel(ident), handler, false).await
    }

    /// Register `handler` for `name`: a `$meta` channel or a server channel.
    pub async fn on<F>(&mut self, name: &str, handler: F) -> SessionResult<ListenerId>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.register(ChannelName::parse(name)?, handler, false).await
    }

    /// Alias of [`on`](Session::on).
    pub async fn add_listener<F>(&mut self, name: &str, handler: F) -> SessionResult<ListenerId>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.on(name, handler).await
    }

    /// Register `handler` for the next event on `name` only.
    ///
    /// On a server channel the registration is dropped and `UNLISTEN` queued
    /// on the connection right before the handler runs, so it precedes any
    /// statement issued once the handler has fired. A failing `UNLISTEN` is
    /// logged, not reported.
    pub async fn once<F>(&mut self, name: &str, handler: F) -> SessionResult<ListenerId>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.register(ChannelName::parse(name)?, handler, true).await
    }

    async fn register<F>(&mut self, channel: ChannelName, handler: F, once: bool) -> SessionResult<ListenerId>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = if once {
            self.listeners().add_once(channel.clone(), handler)
        } else {
            self.listeners().add(channel.clone(), handler)
        };

        if let ChannelName::Channel(ident) = &channel {
            if let Err(err) = self.listen_identifier(ident).await {
                self.listeners().remove(&channel, id);
                return Err(err);
            }
        }
        tracing::debug!(channel = %channel, once, "listener registered");
        Ok(id)
    }

    /// Remove a registration made by [`on`](Session::on) or
    /// [`once`](Session::once).
    ///
    /// On a server channel `UNLISTEN` is issued whether or not the listener
    /// was still registered. Returns whether a registration was removed.
    pub async fn remove_listener(&mut self, name: &str, id: ListenerId) -> SessionResult<bool> {
        let channel = ChannelName::parse(name)?;
        let removed = self.listeners().remove(&channel, id);
        if let ChannelName::Channel(ident) = &channel {
            self.unlisten_identifier(ident).await?;
        }
        Ok(removed)
    }

    /// Publish `args` on `name`.
    ///
    /// On a server channel the arguments are sent as a JSON-array payload
    /// (no payload at all when `args` is empty). On a `$meta` channel the
    /// local listeners are invoked directly.
    pub async fn emit(&mut self, name: &str, args: &[Value]) -> SessionResult<()> {
        match ChannelName::parse(name)? {
            meta @ ChannelName::Meta(_) => {
                self.listeners().dispatch(&meta, args);
                Ok(())
            }
            ChannelName::Channel(ident) if args.is_empty() => self.notify_identifier(&ident, None).await,
            ChannelName::Channel(ident) => {
                let payload = encode_args(args).map_err(SessionError::Payload)?;
                self.notify_identifier(&ident, Some(&payload)).await
            }
        }
    }
}
