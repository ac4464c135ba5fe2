//! Connection establishment.
//!
//! A [`Connection`] executes the handshake over a transport and owns the
//! parsed [`ConnectionResponse`] for its lifetime. The session splits it
//! into its read and write halves once the read loop and writer task start.

use std::fmt;

use crate::error::Result;
use crate::protocol::{ConnectionParams, ConnectionResponse};
use crate::transport::{Transport, TransportReader, TransportWriter};

/// Lifecycle state of a session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake completed; frames are flowing.
    Connected,
    /// Closed locally or by transport loss.
    Closed,
    /// The server aborted the session.
    ClosedByServer,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
            ConnectionState::ClosedByServer => "closed by server",
        };
        f.write_str(name)
    }
}

/// An established connection, pre-split.
pub struct Connection {
    response: ConnectionResponse,
    transport: Box<dyn Transport>,
}

impl Connection {
    /// Connect and perform the handshake.
    ///
    /// Sends the headers derived from `params` while establishing the
    /// transport, then parses the fixed-layout binary response. Any non-OK
    /// response code or malformed response fails the attempt.
    pub async fn open(
        mut transport: Box<dyn Transport>,
        params: &ConnectionParams,
    ) -> Result<Self> {
        let headers = params.to_headers();
        let raw = transport.connect(params.url(), &headers).await?;
        let response = ConnectionResponse::parse(&raw)?;
        tracing::debug!(
            "Connected; session {}, ping period {}ms, max message {} bytes",
            response.session_id(),
            response.ping_period(),
            response.maximum_message_size()
        );
        Ok(Self {
            response,
            transport,
        })
    }

    /// The parsed handshake response.
    pub fn response(&self) -> &ConnectionResponse {
        &self.response
    }

    /// Tear into the response and the two transport halves.
    pub fn into_split(
        self,
    ) -> (
        ConnectionResponse,
        Box<dyn TransportReader>,
        Box<dyn TransportWriter>,
    ) {
        let (reader, writer) = self.transport.into_split();
        (self.response, reader, writer)
    }
}
