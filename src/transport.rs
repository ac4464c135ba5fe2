//! Transport boundary.
//!
//! The session does not own connection mechanics; it drives any transport
//! that can deliver the handshake response and then exchange discrete binary
//! frames. A frame here is one complete inbound or outbound byte sequence -
//! the transport provides message boundaries, the protocol layer only adds
//! the tag byte and payload inside them.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::Result;

/// An unconnected transport.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Establish the underlying connection, presenting the handshake
    /// headers, and return the raw handshake response bytes.
    async fn connect(
        &mut self,
        url: &Url,
        headers: &HashMap<&'static str, String>,
    ) -> Result<Bytes>;

    /// Split into independently owned read and write halves.
    fn into_split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>);
}

/// Inbound half of a connected transport.
#[async_trait]
pub trait TransportReader: Send + 'static {
    /// The next inbound frame, or `None` once the peer has closed.
    async fn receive(&mut self) -> Result<Option<Bytes>>;
}

/// Outbound half of a connected transport.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    /// Send one frame.
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}
