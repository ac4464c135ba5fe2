//! Session façade.
//!
//! The [`Session`] is the single integration point over an established
//! connection: it creates conversations for outbound requests, frames and
//! sends them through the writer task, and runs the read loop that routes
//! every inbound frame to the right conversation, service or registered
//! event handler.
//!
//! # Example
//!
//! ```ignore
//! use fluxion_client::conversation::IdGenerator;
//! use fluxion_client::session::Session;
//!
//! let set_ids = IdGenerator::new();
//! let session = Session::builder()
//!     .principal("admin")
//!     .password("secret")
//!     .connect("ws://server.example", transport, &set_ids)
//!     .await?;
//!
//! let value = session.request(echo_service, payload).await?;
//! ```

mod connection;

pub use connection::{Connection, ConnectionState};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::conversation::{
    response_channel, Conversation, ConversationHandler, ConversationSet, DiscardReason,
    IdGenerator,
};
use crate::error::{ClientError, Result};
use crate::protocol::{
    encode_service_error, encode_service_request, encode_service_response, ConnectionParams,
    ConnectionResponse, InboundFrame, MessageKind, ServiceErrorFrame, ServiceRequestFrame,
    ServiceResponseFrame, SessionId,
};
use crate::service::Service;
use crate::transport::{Transport, TransportReader};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Key under which an inbound event handler is registered.
///
/// Commonly a service type paired with a path or selector; message-kind ids
/// address the topic notification streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    service_type: u32,
    path: Option<String>,
}

impl HandlerKey {
    /// Key for every event of one service type.
    pub fn service(service_type: u32) -> Self {
        Self {
            service_type,
            path: None,
        }
    }

    /// Key for events of one service type scoped to a path or selector.
    pub fn service_path(service_type: u32, path: impl Into<String>) -> Self {
        Self {
            service_type,
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "({}, {})", self.service_type, path),
            None => write!(f, "({})", self.service_type),
        }
    }
}

/// Callback invoked for inbound events routed by [`HandlerKey`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one inbound event payload.
    async fn on_event(&self, payload: Bytes) -> Result<()>;
}

/// Builder for configuring and connecting a [`Session`].
pub struct SessionBuilder {
    principal: Option<String>,
    password: Option<String>,
    properties: HashMap<String, String>,
    capabilities: Option<u8>,
    server_name: Option<String>,
    reconnect_timeout: Option<u64>,
    services: HashMap<u32, Arc<dyn Service>>,
    handlers: HashMap<HandlerKey, Arc<dyn EventHandler>>,
    channel_capacity: usize,
}

impl SessionBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            principal: None,
            password: None,
            properties: HashMap::new(),
            capabilities: None,
            server_name: None,
            reconnect_timeout: None,
            services: HashMap::new(),
            handlers: HashMap::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Authenticate as the given principal.
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Password credential for the principal.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add one user-defined session property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replace the user-defined session properties.
    pub fn properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Override the capability bitmask.
    pub fn capabilities(mut self, capabilities: u8) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Request a specific server by name.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Reconnect timeout advertised to the server, in milliseconds.
    pub fn reconnect_timeout(mut self, timeout_ms: u64) -> Self {
        self.reconnect_timeout = Some(timeout_ms);
        self
    }

    /// Host a service: inbound requests for its type id are routed to it.
    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.insert(service.type_id(), service);
        self
    }

    /// Register an event handler under a dispatch key.
    pub fn handle(mut self, key: HandlerKey, handler: impl EventHandler + 'static) -> Self {
        self.handlers.insert(key, Arc::new(handler));
        self
    }

    /// Outbound queue capacity for the writer task.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Connect, perform the handshake and start the session.
    ///
    /// `set_ids` is the process-wide allocator giving this session's
    /// conversation set its distinct identity.
    pub async fn connect(
        self,
        url: &str,
        transport: Box<dyn Transport>,
        set_ids: &IdGenerator,
    ) -> Result<Session> {
        let mut params = ConnectionParams::new(url)?;
        if let Some(capabilities) = self.capabilities {
            params = params.capabilities(capabilities);
        }
        if let Some(principal) = self.principal {
            params = params.principal(principal);
        }
        if let Some(password) = self.password {
            params = params.password(password);
        }
        if let Some(name) = self.server_name {
            params = params.server_name(name);
        }
        if let Some(timeout) = self.reconnect_timeout {
            params = params.reconnect_timeout(timeout);
        }
        if !self.properties.is_empty() {
            params = params.session_properties(self.properties);
        }

        let connection = Connection::open(transport, &params).await?;
        let (response, reader, writer) = connection.into_split();

        let (writer_handle, writer_task) = spawn_writer_task(writer, self.channel_capacity);
        let conversations = Arc::new(ConversationSet::new(set_ids)?);
        let core = Arc::new(SessionCore {
            conversations,
            services: self.services,
            handlers: self.handlers,
            writer: writer_handle.clone(),
            state: Mutex::new(ConnectionState::Connected),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let read_core = core.clone();
        let read_task = tokio::spawn(async move {
            if let Err(err) = read_loop(reader, read_core).await {
                tracing::error!("Read loop failed: {}", err);
            }
            let _ = shutdown_tx.send(());
        });

        Ok(Session {
            response,
            core,
            writer: writer_handle,
            shutdown_rx,
            read_task,
            writer_task,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state between the façade and the read loop.
struct SessionCore {
    conversations: Arc<ConversationSet>,
    services: HashMap<u32, Arc<dyn Service>>,
    handlers: HashMap<HandlerKey, Arc<dyn EventHandler>>,
    writer: WriterHandle,
    state: Mutex<ConnectionState>,
}

impl SessionCore {
    /// Route an inbound frame. Returns `false` once the session must stop
    /// reading (server abort).
    async fn dispatch(&self, frame: InboundFrame) -> bool {
        let kind = frame.kind;
        let result = match kind {
            MessageKind::ServiceRequest => self.on_service_request(frame.payload).await,
            MessageKind::ServiceResponse => self.on_service_response(frame.payload).await,
            MessageKind::ServiceError => self.on_service_error(frame.payload).await,
            MessageKind::TopicValue | MessageKind::TopicDelta => {
                self.handle(&HandlerKey::service(u32::from(kind.id())), frame.payload)
                    .await
            }
            MessageKind::Abort => {
                self.on_abort().await;
                return false;
            }
        };

        if let Err(err) = result {
            match err {
                ClientError::NoSuchConversation(id) => {
                    tracing::warn!("Response for unknown conversation {}", id);
                }
                ClientError::NoSuchHandler(key) => {
                    tracing::debug!("No handler for inbound event {}", key);
                }
                err => tracing::error!("Failed to process {:?} frame: {}", kind, err),
            }
        }
        true
    }

    /// Server-initiated request: the addressed service produces the response
    /// payload, framed with the same conversation id.
    async fn on_service_request(&self, payload: Bytes) -> Result<()> {
        let request = ServiceRequestFrame::decode(payload)?;
        let Some(service) = self.services.get(&request.service_type) else {
            tracing::warn!("Request for unknown service {}", request.service_type);
            let error = ClientError::NoSuchService(request.service_type);
            return self
                .writer
                .send(encode_service_error(request.cid, &error.to_string()))
                .await;
        };

        match service.respond(request.payload).await {
            Ok(response) => {
                self.writer
                    .send(encode_service_response(request.cid, &response))
                    .await
            }
            Err(err) => {
                tracing::warn!(
                    "Service {} failed to handle request: {}",
                    request.service_type,
                    err
                );
                self.writer
                    .send(encode_service_error(request.cid, &err.to_string()))
                    .await
            }
        }
    }

    async fn on_service_response(&self, payload: Bytes) -> Result<()> {
        let response = ServiceResponseFrame::decode(payload)?;
        let conversation = self
            .conversations
            .get(response.cid)
            .ok_or(ClientError::NoSuchConversation(response.cid))?;

        let value = match conversation.service().consume(response.payload) {
            Ok(value) => value,
            Err(err) => {
                let reason = DiscardReason::new(format!("Undecodable response: {err}"));
                conversation.discard(reason).await?;
                return Err(err);
            }
        };

        let outcome = conversation.respond(value).await?;
        tracing::debug!("Conversation {}: {:?}", response.cid, outcome);
        Ok(())
    }

    async fn on_service_error(&self, payload: Bytes) -> Result<()> {
        let error = ServiceErrorFrame::decode(payload)?;
        let conversation = self
            .conversations
            .get(error.cid)
            .ok_or(ClientError::NoSuchConversation(error.cid))?;
        conversation
            .discard(DiscardReason::service_error(error.message))
            .await
    }

    async fn on_abort(&self) {
        tracing::warn!("Session aborted by server");
        self.transition(ConnectionState::ClosedByServer);
        self.conversations
            .discard_all(DiscardReason::new(
                ClientError::SessionAborted.to_string(),
            ))
            .await;
    }

    async fn connection_lost(&self, why: &str) {
        self.transition(ConnectionState::Closed);
        self.conversations
            .discard_all(DiscardReason::new(why))
            .await;
    }

    fn transition(&self, to: ConnectionState) {
        let mut state = self.state.lock().unwrap();
        if *state == ConnectionState::Connected {
            *state = to;
        }
    }

    async fn handle(&self, key: &HandlerKey, payload: Bytes) -> Result<()> {
        let handler = self
            .handlers
            .get(key)
            .ok_or_else(|| ClientError::NoSuchHandler(key.to_string()))?;
        handler.on_event(payload).await
    }
}

/// One inbound frame at a time: parse, then dispatch.
async fn read_loop(mut reader: Box<dyn TransportReader>, core: Arc<SessionCore>) -> Result<()> {
    loop {
        let data = match reader.receive().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                core.connection_lost("Connection closed by peer").await;
                return Ok(());
            }
            Err(err) => {
                core.connection_lost(&format!("Transport failure: {err}"))
                    .await;
                return Err(err);
            }
        };

        let frame = match InboundFrame::parse(data) {
            Ok(frame) => frame,
            Err(ClientError::UnknownMessageType(id)) => {
                tracing::warn!("Ignoring frame with unknown message type {}", id);
                continue;
            }
            Err(err) => {
                tracing::warn!("Dropping malformed frame: {}", err);
                continue;
            }
        };

        if !core.dispatch(frame).await {
            return Ok(());
        }
    }
}

/// A connected session.
pub struct Session {
    response: ConnectionResponse,
    core: Arc<SessionCore>,
    writer: WriterHandle,
    shutdown_rx: oneshot::Receiver<()>,
    read_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Session {
    /// Create a session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The server-assigned session identity.
    pub fn session_id(&self) -> SessionId {
        self.response.session_id()
    }

    /// Expected ping interval, in milliseconds.
    pub fn ping_period(&self) -> u64 {
        self.response.ping_period()
    }

    /// Largest message the server accepts, in bytes.
    pub fn maximum_message_size(&self) -> u32 {
        self.response.maximum_message_size()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.core.state.lock().unwrap()
    }

    /// Send a request and await its response.
    ///
    /// A fresh conversation is created for the exchange; the call resolves
    /// with the service-decoded response value, or with the error that
    /// terminated the conversation.
    pub async fn request(&self, service: Arc<dyn Service>, request: Bytes) -> Result<Bytes> {
        let (responder, handle) = response_channel();
        let conversation = self
            .core
            .conversations
            .new_conversation(service.clone(), Box::new(responder))
            .await?;

        // A poisoned set hands back an already-discarded conversation; the
        // responder has the reason, so skip the send.
        if !conversation.is_finished() {
            let frame = encode_service_request(service.type_id(), conversation.id(), &request);
            self.writer.send(frame).await?;
        }
        handle.get().await
    }

    /// Send a request correlated to a caller-supplied conversation.
    ///
    /// Use with [`new_conversation`](Self::new_conversation) when a custom
    /// handler needs to observe multiple responses before closing.
    pub async fn request_with(
        &self,
        conversation: &Arc<Conversation>,
        request: Bytes,
    ) -> Result<()> {
        let frame = encode_service_request(
            conversation.service().type_id(),
            conversation.id(),
            &request,
        );
        self.writer.send(frame).await
    }

    /// Create a conversation with a caller-supplied handler.
    pub async fn new_conversation(
        &self,
        service: Arc<dyn Service>,
        handler: Box<dyn ConversationHandler>,
    ) -> Result<Arc<Conversation>> {
        self.core.conversations.new_conversation(service, handler).await
    }

    /// Fire-and-forget: queue one pre-framed message for sending.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.writer.send(frame).await
    }

    /// Dispatch an event to the handler registered under `key`.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoSuchHandler`] when no registration matches.
    pub async fn handle(&self, key: &HandlerKey, payload: Bytes) -> Result<()> {
        self.core.handle(key, payload).await
    }

    /// Block until the connection ends (peer close or server abort).
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let _ = self.shutdown_rx.await;
        Ok(())
    }

    /// Close the session, discarding every in-flight conversation.
    pub async fn close(mut self) -> Result<()> {
        self.core.transition(ConnectionState::Closed);
        self.core
            .conversations
            .discard_all(DiscardReason::new("Session closed"))
            .await;

        self.read_task.abort();
        let _ = (&mut self.read_task).await;

        // Release every writer handle so the writer task drains and closes
        // the transport.
        drop(self.writer);
        drop(self.core);
        let _ = self.writer_task.await;
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id().to_string())
            .field("state", &self.state())
            .finish()
    }
}
