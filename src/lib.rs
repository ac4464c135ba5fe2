//! # fluxion-client
//!
//! Client SDK core for the Fluxion real-time data server.
//!
//! This crate implements the wire-protocol layer a session rides on:
//!
//! - **Handshake**: typed connection parameters serialized to short header
//!   keys, and the fixed-layout binary connection response carrying the
//!   session identity and token.
//! - **Framing**: tag-byte message frames with optional zlib-compressed
//!   payloads, dispatched over a closed message-kind registry.
//! - **Conversations**: per-request correlation ids, a per-conversation
//!   state machine, and a registry that delivers each response or discard
//!   reason to the right waiting caller exactly once.
//! - **Session properties**: the quoted/escaped string grammar used in
//!   handshake headers and property-bearing payloads.
//!
//! Transport mechanics (WebSocket or otherwise) stay behind the
//! [`Transport`] trait; per-request payload contents stay behind the
//! [`Service`] trait.
//!
//! ## Example
//!
//! ```ignore
//! use fluxion_client::conversation::IdGenerator;
//! use fluxion_client::Session;
//!
//! #[tokio::main]
//! async fn main() -> fluxion_client::Result<()> {
//!     let set_ids = IdGenerator::new();
//!     let session = Session::builder()
//!         .principal("admin")
//!         .password("secret")
//!         .connect("ws://server.example", transport, &set_ids)
//!         .await?;
//!
//!     let response = session.request(pricing_service, request_payload).await?;
//!     session.close().await
//! }
//! ```

pub mod conversation;
pub mod error;
pub mod properties;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;

mod writer;

pub use conversation::{
    Conversation, ConversationHandler, ConversationId, ConversationSet, ConversationState,
    DiscardReason, IdGenerator, RespondOutcome,
};
pub use error::{ClientError, Result};
pub use service::Service;
pub use session::{ConnectionState, EventHandler, HandlerKey, Session, SessionBuilder};
pub use transport::{Transport, TransportReader, TransportWriter};
