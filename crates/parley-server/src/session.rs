//! One WebSocket connection.
//!
//! A session starts anonymous, binds to an identity on `auth` and from then
//! on may only act as that identity. Every failed action is answered with
//! an `error` frame; the connection stays open.

use std::fmt;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use parley_shared::protocol::{InboundEvent, OutboundEvent};
use parley_shared::types::UserId;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::presence::SessionHandle;
use crate::rate_limit::EventRateLimiter;
use crate::router::DeliveryRouter;

pub struct ConnectionSession {
    handle: SessionHandle,
    identity: Option<UserId>,
    router: DeliveryRouter,
    limiter: EventRateLimiter,
}

impl ConnectionSession {
    pub fn new(handle: SessionHandle, router: DeliveryRouter, limiter: EventRateLimiter) -> Self {
        Self {
            handle,
            identity: None,
            router,
            limiter,
        }
    }

    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    /// Decode one text frame and act on it.
    pub async fn handle_text(&mut self, text: &str) {
        match InboundEvent::from_json(text) {
            Ok(event) => self.on_event(event).await,
            Err(e) => {
                debug!(session = %self.handle.id(), error = %e, "Undecodable frame");
                self.reply_error("unknown", &ServerError::Validation(e.to_string()));
            }
        }
    }

    pub async fn on_event(&mut self, event: InboundEvent) {
        let action = event.action();
        if let Err(err) = self.dispatch(event).await {
            debug!(
                session = %self.handle.id(),
                action,
                kind = err.kind(),
                error = %err,
                "Action rejected"
            );
            self.reply_error(action, &err);
        }
    }

    async fn dispatch(&mut self, event: InboundEvent) -> Result<(), ServerError> {
        match event {
            InboundEvent::Auth(req) => self.authenticate(req.user_id),
            InboundEvent::Chat(req) => {
                self.acting_as(&req.sender_id).await?;
                self.router.send(Some(&self.handle), &req)?;
                Ok(())
            }
            InboundEvent::DeleteMessage(req) => {
                self.acting_as(&req.user_id).await?;
                self.router.delete(Some(&self.handle), &req)?;
                Ok(())
            }
            InboundEvent::Reaction(req) => {
                self.acting_as(&req.user_id).await?;
                self.router.react(Some(&self.handle), &req)?;
                Ok(())
            }
            InboundEvent::CallSignal(req) => {
                let me = self.authorized().await?;
                self.router.relay_call_signal(me, req);
                Ok(())
            }
        }
    }

    /// Bind (or rebind) this connection to `user`.
    fn authenticate(&mut self, user: UserId) -> Result<(), ServerError> {
        self.router.resolve_user(&user)?;
        let presence = self.router.presence();

        if let Some(previous) = self.identity.filter(|prev| *prev != user) {
            presence.unregister(&previous, self.handle.id());
        }
        if let Some(replaced) = presence.register(user, self.handle.clone()) {
            if replaced.id() != self.handle.id() {
                debug!(
                    user = %user.short(),
                    old_session = %replaced.id(),
                    "Older session no longer receives pushes"
                );
            }
        }

        self.identity = Some(user);
        self.handle.push(OutboundEvent::Authenticated { user_id: user });
        Ok(())
    }

    async fn authorized(&self) -> Result<UserId, ServerError> {
        let me = self
            .identity
            .ok_or_else(|| ServerError::Forbidden("authenticate first".into()))?;
        if !self.limiter.check(&me).await {
            return Err(ServerError::RateLimited);
        }
        Ok(me)
    }

    async fn acting_as(&self, claimed: &UserId) -> Result<(), ServerError> {
        let me = self.authorized().await?;
        if me != *claimed {
            return Err(ServerError::Forbidden(format!(
                "session is bound to {}, cannot act as {}",
                me, claimed
            )));
        }
        Ok(())
    }

    fn reply_error(&self, action: &str, err: &ServerError) {
        self.handle.push(OutboundEvent::Error {
            action: action.to_string(),
            kind: err.kind().to_string(),
            reason: err.public_reason(),
        });
    }

    /// Leave the presence registry if this connection still owns the entry.
    pub fn close(&mut self) {
        if let Some(user) = self.identity.take() {
            self.router.presence().unregister(&user, self.handle.id());
        }
    }
}

/// Drive one upgraded socket until the peer leaves, the transport fails or
/// no `auth` arrives within the configured timeout.
pub async fn run(
    socket: WebSocket,
    router: DeliveryRouter,
    limiter: EventRateLimiter,
    config: &ServerConfig,
) {
    let (sink, stream) = socket.split();
    drive(sink, stream, router, limiter, config).await;
}

/// The connection loop over any frame sink and stream.
async fn drive<Tx, Rx, E>(
    mut sink: Tx,
    mut stream: Rx,
    router: DeliveryRouter,
    limiter: EventRateLimiter,
    config: &ServerConfig,
) where
    Tx: Sink<WsMessage> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: fmt::Display,
{
    let (handle, mut outbound) = SessionHandle::channel(config.outbound_queue_capacity);
    let session_id = handle.id();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Failed to encode outbound frame");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    info!(session = %session_id, "Connection opened");
    let mut session = ConnectionSession::new(handle, router, limiter);

    let auth_deadline = tokio::time::sleep(config.auth_timeout);
    tokio::pin!(auth_deadline);

    loop {
        tokio::select! {
            _ = &mut auth_deadline, if session.identity().is_none() => {
                info!(session = %session_id, "No auth before timeout, closing");
                break;
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => session.handle_text(&text).await,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Binary(_))) => {
                        debug!(session = %session_id, "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session = %session_id, error = %e, "Transport error");
                        break;
                    }
                }
            }
        }
    }

    session.close();
    drop(session);
    writer.abort();
    info!(session = %session_id, "Connection closed");
}
