//! Error types for fluxion-client.

use thiserror::Error;

use crate::conversation::ConversationId;
use crate::protocol::ResponseCode;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error from the transport or payload decompression.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error (wrong marker byte, wrong version, malformed frame).
    /// Fatal at the connection level.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered the handshake with a non-OK response code.
    #[error("Connection rejected by server: {code}")]
    ServerConnection {
        /// Response code from the handshake.
        code: ResponseCode,
    },

    /// A service error frame was received for one conversation.
    /// Local to that conversation, not fatal to the session.
    #[error("Service error: {0}")]
    ServiceMessage(String),

    /// The server unilaterally aborted the session.
    #[error("Session aborted by server")]
    SessionAborted,

    /// The identifier generator reached its upper bound.
    #[error("Conversation identifier space exhausted")]
    IdsExhausted,

    /// An inbound response referenced a conversation this client is not
    /// tracking. The read loop logs this and continues.
    #[error("No such conversation: {0}")]
    NoSuchConversation(ConversationId),

    /// The conversation was discarded before a normal response arrived.
    #[error("Conversation discarded: {0}")]
    Discarded(String),

    /// No handler registered under the dispatch key.
    #[error("No handler registered for key: {0}")]
    NoSuchHandler(String),

    /// An inbound service request named a service this session does not host.
    #[error("No such service: {0}")]
    NoSuchService(u32),

    /// Inbound frame carried an unregistered message type id.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// The connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The configured server URL could not be parsed or resolved.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// A property list slated for encoding contained an absent element.
    #[error("Property list contains an absent element")]
    NullPropertyElement,
}

impl ClientError {
    /// Whether this error is an expected domain error.
    ///
    /// Expected errors are the shapes a discard reason ordinarily takes; a
    /// handler's `on_discard` failing with one of these is logged and
    /// swallowed, while any other failure propagates.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ClientError::Discarded(_) | ClientError::ServiceMessage(_)
        )
    }
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_classification() {
        assert!(ClientError::Discarded("gone".into()).is_expected());
        assert!(ClientError::ServiceMessage("bad request".into()).is_expected());
        assert!(!ClientError::SessionAborted.is_expected());
        assert!(!ClientError::Protocol("junk".into()).is_expected());
        assert!(!ClientError::IdsExhausted.is_expected());
    }

    #[test]
    fn test_display_carries_detail() {
        let err = ClientError::NoSuchHandler("(14, alerts)".into());
        assert!(err.to_string().contains("(14, alerts)"));
    }
}
