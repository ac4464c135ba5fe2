//! Protocol module - handshake layout, connection parameters, message framing.
//!
//! This module implements the binary wire protocol:
//! - fixed-layout connection response parsing
//! - handshake header construction from typed parameters
//! - tag-byte message framing with optional zlib payload compression

mod connect;
mod message;
mod params;

pub use connect::{
    ConnectionResponse, ResponseCode, SessionId, SessionToken, PROTOCOL_MARKER, PROTOCOL_VERSION,
    SESSION_TOKEN_LENGTH,
};
pub use message::{
    encode_abort, encode_service_error, encode_service_request, encode_service_response,
    InboundFrame, MessageKind, ServiceErrorFrame, ServiceRequestFrame, ServiceResponseFrame,
    COMPRESSED_FLAG, KIND_MASK,
};
pub use params::{capabilities, headers, ConnectionParams, CLIENT_TYPE};
