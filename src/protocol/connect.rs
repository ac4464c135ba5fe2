//! Connection handshake response layout.
//!
//! The server answers a connect attempt with a fixed binary record:
//!
//! ```text
//! ┌────────┬─────────┬──────┬────────────┬───────────────┬─────────────┬──────────┐
//! │ Marker │ Version │ Code │ Session ID │ Session Token │ Ping period │ Max size │
//! │ 1 byte │ 1 byte  │ 1 B  │ 16 bytes   │ 24 bytes      │ 8 bytes     │ 4 bytes  │
//! │ 0x23   │         │      │ 2x u64 BE  │ opaque        │ u64 BE, ms  │ u32 BE   │
//! └────────┴─────────┴──────┴────────────┴───────────────┴─────────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use std::fmt;

use crate::error::{ClientError, Result};

/// Protocol marker byte opening every handshake response (`#`).
pub const PROTOCOL_MARKER: u8 = 0x23;

/// Protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u8 = 23;

/// Length of the opaque session token.
pub const SESSION_TOKEN_LENGTH: usize = 24;

/// Minimum length of a complete handshake response.
const CONNECTION_RESPONSE_LENGTH: usize = 55;

/// Server verdict on a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Connection accepted.
    Ok = 100,
    /// Connection accepted at a lower protocol version.
    DowngradedConnection = 102,
    /// Session reconnected.
    Reconnected = 105,
    /// Session reconnected, messages were lost.
    ReconnectedWithMessageLoss = 106,
    /// Connection rejected.
    Rejected = 111,
    /// Server license limit exceeded.
    LicenseExceeded = 113,
    /// Credentials rejected.
    AuthenticationFailed = 116,
    /// The presented session token is unknown to the server.
    UnknownSession = 117,
}

impl ResponseCode {
    /// Decode a response code byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            100 => Some(ResponseCode::Ok),
            102 => Some(ResponseCode::DowngradedConnection),
            105 => Some(ResponseCode::Reconnected),
            106 => Some(ResponseCode::ReconnectedWithMessageLoss),
            111 => Some(ResponseCode::Rejected),
            113 => Some(ResponseCode::LicenseExceeded),
            116 => Some(ResponseCode::AuthenticationFailed),
            117 => Some(ResponseCode::UnknownSession),
            _ => None,
        }
    }

    /// The wire byte for this code.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Whether this code denotes a successful connect.
    pub fn is_ok(self) -> bool {
        matches!(self, ResponseCode::Ok)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.byte(), self)
    }
}

/// Server-assigned session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    server: u64,
    value: u64,
}

impl SessionId {
    /// Assemble from its two components.
    pub const fn new(server: u64, value: u64) -> Self {
        Self { server, value }
    }

    /// The server identity component.
    pub const fn server(self) -> u64 {
        self.server
    }

    /// The per-server session value component.
    pub const fn value(self) -> u64 {
        self.value
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.server, self.value)
    }
}

/// Opaque reconnection token allocated by the server.
///
/// The token is a credential: its bytes are never logged, and the `Debug`
/// output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken([u8; SESSION_TOKEN_LENGTH]);

impl SessionToken {
    /// Wrap raw token bytes.
    pub const fn new(bytes: [u8; SESSION_TOKEN_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex rendering used by the reconnection handshake header.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Decoded handshake response. Constructed once per successful connect and
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct ConnectionResponse {
    code: ResponseCode,
    session_id: SessionId,
    session_token: SessionToken,
    ping_period: u64,
    maximum_message_size: u32,
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}

impl ConnectionResponse {
    /// Parse a raw handshake response.
    ///
    /// # Errors
    ///
    /// [`ClientError::Protocol`] on a short buffer, wrong marker byte,
    /// unsupported version or unrecognized response code;
    /// [`ClientError::ServerConnection`] carrying the code when the server
    /// answered with anything other than OK.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CONNECTION_RESPONSE_LENGTH {
            return Err(ClientError::Protocol(format!(
                "Connection response too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != PROTOCOL_MARKER {
            return Err(ClientError::Protocol(format!(
                "Bad protocol marker byte: 0x{:02x}",
                data[0]
            )));
        }
        if data[1] != PROTOCOL_VERSION {
            return Err(ClientError::Protocol(format!(
                "Unsupported protocol version: {}",
                data[1]
            )));
        }
        let code = ResponseCode::from_byte(data[2]).ok_or_else(|| {
            ClientError::Protocol(format!("Unrecognized response code: {}", data[2]))
        })?;
        if !code.is_ok() {
            return Err(ClientError::ServerConnection { code });
        }

        let session_id = SessionId::new(read_u64(data, 3), read_u64(data, 11));
        let mut token = [0u8; SESSION_TOKEN_LENGTH];
        token.copy_from_slice(&data[19..19 + SESSION_TOKEN_LENGTH]);

        Ok(Self {
            code,
            session_id,
            session_token: SessionToken::new(token),
            ping_period: read_u64(data, 43),
            maximum_message_size: read_u32(data, 51),
        })
    }

    /// The server's response code (always OK on a parsed instance).
    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// The assigned session identity.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The reconnection token.
    pub fn session_token(&self) -> &SessionToken {
        &self.session_token
    }

    /// Expected ping interval, in milliseconds.
    pub fn ping_period(&self) -> u64 {
        self.ping_period
    }

    /// Largest message the server will accept, in bytes.
    pub fn maximum_message_size(&self) -> u32 {
        self.maximum_message_size
    }
}
