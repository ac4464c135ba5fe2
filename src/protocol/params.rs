//! Connection handshake parameters.
//!
//! Typed fields mapped onto the short header keys the server expects during
//! the connect handshake. Unset fields are omitted from the header map; the
//! URL addresses the connection and is never sent as a header itself.

use std::collections::HashMap;

use url::Url;

use super::connect::{SessionToken, PROTOCOL_VERSION};
use crate::error::{ClientError, Result};
use crate::properties;

/// Capability bits carried in the `ca` header.
///
/// Independent flags ORed together; the connection layer carries the combined
/// value without interpreting it.
pub mod capabilities {
    /// No optional capability.
    pub const NONE: u8 = 0;
    /// Client accepts zlib-compressed message payloads.
    pub const ZLIB: u8 = 0b0010;
    /// Client speaks the unified protocol mode.
    pub const UNIFIED: u8 = 0b1000;
}

/// Canonical header keys for each handshake parameter.
pub mod headers {
    /// Protocol version.
    pub const VERSION: &str = "v";
    /// Session token presented for reconnection.
    pub const SESSION_TOKEN: &str = "c";
    /// Capability bitmask.
    pub const CAPABILITIES: &str = "ca";
    /// Principal (username).
    pub const PRINCIPAL: &str = "username";
    /// Reconnect timeout, milliseconds.
    pub const RECONNECT_TIMEOUT: &str = "r";
    /// Password credential.
    pub const PASSWORD: &str = "password";
    /// First client sequence available for replay.
    pub const AVAILABLE_CLIENT_SEQUENCE: &str = "cs";
    /// Last server sequence received.
    pub const LAST_SERVER_SEQUENCE: &str = "ss";
    /// Client type tag.
    pub const CLIENT_TYPE: &str = "ty";
    /// Session properties map.
    pub const SESSION_PROPERTIES: &str = "sp";
    /// Requested server name.
    pub const SERVER_NAME: &str = "svn";
}

/// Client type tag this SDK sends in the `ty` header.
pub const CLIENT_TYPE: &str = "RS";

/// Fixed relative path every connect URL resolves against.
const CONNECT_PATH: &str = "diffusion";

/// Typed handshake parameters.
///
/// Built once per connect attempt; the connect URL is resolved at
/// construction time.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    url: Url,
    version: u8,
    session_token: Option<SessionToken>,
    capabilities: u8,
    principal: Option<String>,
    reconnect_timeout: Option<u64>,
    password: Option<String>,
    available_client_sequence: Option<u64>,
    last_server_sequence: Option<u64>,
    client_type: &'static str,
    session_properties: Option<HashMap<String, String>>,
    server_name: Option<String>,
}

impl ConnectionParams {
    /// Create parameters for the given base URL.
    ///
    /// The base is resolved against the fixed connect path with standard
    /// URL-join semantics, so `ws://host` becomes `ws://host/diffusion` and a
    /// trailing path segment is replaced.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;
        let url = base
            .join(CONNECT_PATH)
            .map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;
        Ok(Self {
            url,
            version: PROTOCOL_VERSION,
            session_token: None,
            capabilities: capabilities::ZLIB | capabilities::UNIFIED,
            principal: None,
            reconnect_timeout: None,
            password: None,
            available_client_sequence: None,
            last_server_sequence: None,
            client_type: CLIENT_TYPE,
            session_properties: None,
            server_name: None,
        })
    }

    /// Present a session token for reconnection.
    pub fn session_token(mut self, token: SessionToken) -> Self {
        self.session_token = Some(token);
        self
    }

    /// Replace the capability bitmask.
    pub fn capabilities(mut self, capabilities: u8) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the principal (username).
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Set the password credential.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the reconnect timeout in milliseconds.
    pub fn reconnect_timeout(mut self, timeout_ms: u64) -> Self {
        self.reconnect_timeout = Some(timeout_ms);
        self
    }

    /// Set the first client sequence available for replay.
    pub fn available_client_sequence(mut self, sequence: u64) -> Self {
        self.available_client_sequence = Some(sequence);
        self
    }

    /// Set the last server sequence received.
    pub fn last_server_sequence(mut self, sequence: u64) -> Self {
        self.last_server_sequence = Some(sequence);
        self
    }

    /// Set the user-defined session properties.
    pub fn session_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.session_properties = Some(properties);
        self
    }

    /// Request a specific server by name.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// The resolved connect URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Handshake headers: one entry per set field.
    pub fn to_headers(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        map.insert(headers::VERSION, self.version.to_string());
        map.insert(headers::CAPABILITIES, self.capabilities.to_string());
        map.insert(headers::CLIENT_TYPE, self.client_type.to_string());
        if let Some(token) = &self.session_token {
            map.insert(headers::SESSION_TOKEN, token.to_hex());
        }
        if let Some(principal) = &self.principal {
            map.insert(headers::PRINCIPAL, principal.clone());
        }
        if let Some(timeout) = self.reconnect_timeout {
            map.insert(headers::RECONNECT_TIMEOUT, timeout.to_string());
        }
        if let Some(password) = &self.password {
            map.insert(headers::PASSWORD, password.clone());
        }
        if let Some(sequence) = self.available_client_sequence {
            map.insert(headers::AVAILABLE_CLIENT_SEQUENCE, sequence.to_string());
        }
        if let Some(sequence) = self.last_server_sequence {
            map.insert(headers::LAST_SERVER_SEQUENCE, sequence.to_string());
        }
        if let Some(props) = &self.session_properties {
            map.insert(
                headers::SESSION_PROPERTIES,
                properties::map_to_string(props),
            );
        }
        if let Some(name) = &self.server_name {
            map.insert(headers::SERVER_NAME, name.clone());
        }
        map
    }
}
