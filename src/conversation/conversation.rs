//! Per-conversation state machine and response delivery.
//!
//! A conversation is one in-flight request/response exchange. Its state moves
//! through:
//!
//! ```text
//! UNRESERVED ──respond──► RESERVED ──┬─► UNRESERVED   (more responses expected)
//!                                    ├─► CLOSED       (handler chose to stop)
//!                                    ├─► DISCARDED    (abandoned with a reason)
//!                                    └─► EXCEPTION    (handler raised)
//! ```
//!
//! `RESERVED` marks a handler in flight; a discard arriving in that window is
//! deferred and delivered once the in-flight `respond` completes. The three
//! right-hand states are terminal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use super::generator::ConversationId;
use crate::error::{ClientError, Result};
use crate::service::Service;

/// Lifecycle state of a [`Conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Idle; a response can be received.
    Unreserved,
    /// A handler is currently executing.
    Reserved,
    /// Terminal: the handler chose to stop.
    Closed,
    /// Terminal: abandoned with a reason.
    Discarded,
    /// Terminal: the handler raised.
    Exception,
}

impl ConversationState {
    /// True for every terminal state.
    pub fn is_finished(self) -> bool {
        !matches!(
            self,
            ConversationState::Unreserved | ConversationState::Reserved
        )
    }
}

/// Outcome of a [`Conversation::respond`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    /// The conversation was already terminal; the handler was not invoked.
    AlreadyFinished,
    /// The handler ran and the conversation is now terminal.
    HandledAndFinished,
    /// The handler ran and more responses may arrive.
    HandledAndActive,
}

/// Why a conversation was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardReason {
    message: String,
    service_error: bool,
}

impl DiscardReason {
    /// A plain discard reason (timeout watchdog, connection loss, shutdown).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            service_error: false,
        }
    }

    /// A reason originating from a service error frame.
    pub fn service_error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            service_error: true,
        }
    }

    /// Human-readable reason text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convert into the error delivered to a waiting caller.
    pub fn into_error(self) -> ClientError {
        if self.service_error {
            ClientError::ServiceMessage(self.message)
        } else {
            ClientError::Discarded(self.message)
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives the responses and the eventual termination of one conversation.
#[async_trait]
pub trait ConversationHandler: Send + Sync {
    /// Handle one response value. Return `true` to close the conversation,
    /// `false` to keep it open for further responses.
    async fn on_response(&self, value: Bytes) -> Result<bool>;

    /// Invoked exactly once when the conversation terminates without a
    /// normal close.
    async fn on_discard(&self, reason: DiscardReason) -> Result<()>;
}

struct Inner {
    state: ConversationState,
    pending_discard: Option<DiscardReason>,
}

/// One in-flight request/response exchange.
///
/// Owned by the [`ConversationSet`](super::ConversationSet) that created it
/// until terminal. State transitions on one conversation are serialized: the
/// respond path holds an async mutex for the duration of the handler, and the
/// state word itself sits behind a plain mutex shared with the discard path.
pub struct Conversation {
    id: ConversationId,
    service: Arc<dyn Service>,
    handler: Box<dyn ConversationHandler>,
    inner: Mutex<Inner>,
    respond_lock: tokio::sync::Mutex<()>,
    data: Mutex<HashMap<String, String>>,
}

impl Conversation {
    pub(crate) fn new(
        id: ConversationId,
        service: Arc<dyn Service>,
        handler: Box<dyn ConversationHandler>,
    ) -> Self {
        Self {
            id,
            service,
            handler,
            inner: Mutex::new(Inner {
                state: ConversationState::Unreserved,
                pending_discard: None,
            }),
            respond_lock: tokio::sync::Mutex::new(()),
            data: Mutex::new(HashMap::new()),
        }
    }

    /// This conversation's identifier.
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// The service this conversation originated from.
    pub fn service(&self) -> Arc<dyn Service> {
        self.service.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConversationState {
        self.inner.lock().unwrap().state
    }

    /// Whether the conversation has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Stash a bookkeeping value on this conversation.
    pub fn put_data(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.lock().unwrap().insert(key.into(), value.into());
    }

    /// Retrieve a bookkeeping value stashed with [`put_data`](Self::put_data).
    pub fn get_data(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    /// Deliver a response value to the handler.
    ///
    /// A terminal conversation returns [`RespondOutcome::AlreadyFinished`]
    /// without touching the handler. Otherwise the state is reserved for the
    /// duration of the handler call; afterwards the conversation closes,
    /// honours a discard that arrived meanwhile, or returns to idle.
    ///
    /// # Errors
    ///
    /// A handler failure notifies `on_discard` exactly once, leaves the
    /// conversation in [`ConversationState::Exception`] and propagates.
    pub async fn respond(&self, value: Bytes) -> Result<RespondOutcome> {
        let _transition = self.respond_lock.lock().await;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.is_finished() {
                return Ok(RespondOutcome::AlreadyFinished);
            }
            inner.state = ConversationState::Reserved;
        }

        match self.handler.on_response(value).await {
            Err(err) => {
                self.inner.lock().unwrap().state = ConversationState::Exception;
                let reason = DiscardReason::new(err.to_string());
                self.notify_discard(reason).await?;
                Err(err)
            }
            Ok(should_close) => {
                let pending = {
                    let mut inner = self.inner.lock().unwrap();
                    if inner.state.is_finished() {
                        // Driven to terminal from inside the handler.
                        return Ok(RespondOutcome::HandledAndFinished);
                    }
                    if should_close {
                        inner.state = ConversationState::Closed;
                        return Ok(RespondOutcome::HandledAndFinished);
                    }
                    match inner.pending_discard.take() {
                        Some(reason) => {
                            inner.state = ConversationState::Discarded;
                            Some(reason)
                        }
                        None => {
                            inner.state = ConversationState::Unreserved;
                            None
                        }
                    }
                };
                match pending {
                    Some(reason) => {
                        self.notify_discard(reason).await?;
                        Ok(RespondOutcome::HandledAndFinished)
                    }
                    None => Ok(RespondOutcome::HandledAndActive),
                }
            }
        }
    }

    /// Abandon the conversation with a reason.
    ///
    /// While a handler is in flight the discard is deferred (first reason
    /// wins) and delivered when the in-flight `respond` completes. On an idle
    /// conversation the discard is immediate. Discarding a terminal
    /// conversation is a no-op.
    pub async fn discard(&self, reason: DiscardReason) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.is_finished() {
                return Ok(());
            }
            if inner.state == ConversationState::Reserved {
                if inner.pending_discard.is_none() {
                    inner.pending_discard = Some(reason);
                }
                return Ok(());
            }
            inner.state = ConversationState::Discarded;
        }
        self.notify_discard(reason).await
    }

    /// Mark the conversation closed.
    ///
    /// Safe to call from inside a handler running under `respond`; the
    /// in-flight call observes the terminal state and stops there.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.state.is_finished() {
            inner.state = ConversationState::Closed;
        }
    }

    /// Invoke `on_discard`, swallowing expected domain errors.
    async fn notify_discard(&self, reason: DiscardReason) -> Result<()> {
        if let Err(err) = self.handler.on_discard(reason).await {
            if err.is_expected() {
                tracing::debug!(
                    "Conversation {}: ignoring expected discard error: {}",
                    self.id,
                    err
                );
            } else {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

type ResponseResult = std::result::Result<Bytes, DiscardReason>;

/// Resolving half of a single request/response pairing.
///
/// Implements [`ConversationHandler`] by resolving its one-shot channel on
/// the first response and closing the conversation. Resolution happens
/// exactly once; a second attempt is logged and ignored, leaving the
/// first-delivered result intact.
pub struct Responder {
    tx: Mutex<Option<oneshot::Sender<ResponseResult>>>,
}

/// Waiting half of a single request/response pairing.
pub struct ResponseHandle {
    rx: oneshot::Receiver<ResponseResult>,
}

/// Create a connected [`Responder`]/[`ResponseHandle`] pair.
pub fn response_channel() -> (Responder, ResponseHandle) {
    let (tx, rx) = oneshot::channel();
    (
        Responder {
            tx: Mutex::new(Some(tx)),
        },
        ResponseHandle { rx },
    )
}

impl Responder {
    fn resolve(&self, result: ResponseResult) {
        match self.tx.lock().unwrap().take() {
            // The waiter may have gone away; that is not our concern.
            Some(tx) => drop(tx.send(result)),
            None => tracing::warn!("Response already resolved; dropping duplicate resolution"),
        }
    }
}

#[async_trait]
impl ConversationHandler for Responder {
    async fn on_response(&self, value: Bytes) -> Result<bool> {
        self.resolve(Ok(value));
        Ok(true)
    }

    async fn on_discard(&self, reason: DiscardReason) -> Result<()> {
        self.resolve(Err(reason));
        Ok(())
    }
}

impl ResponseHandle {
    /// Suspend until the conversation resolves.
    ///
    /// Returns the delivered value, or the discard reason as an error.
    pub async fn get(self) -> Result<Bytes> {
        match self.rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(reason.into_error()),
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }
}
