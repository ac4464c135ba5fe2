//! Service boundary.
//!
//! A service is the per-request-type payload codec plus business logic that
//! rides on the conversation layer. The framing code never looks inside a
//! service payload: it hands the service its bytes and forwards whatever the
//! service produces.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Opaque per-request-type payload producer/consumer.
///
/// Implementations are registered with a session by numeric type id. The
/// session invokes [`respond`](Service::respond) for inbound requests
/// addressed to the service and [`consume`](Service::consume) to decode the
/// payload of a response before delivering it to the waiting conversation.
#[async_trait]
pub trait Service: Send + Sync {
    /// Numeric service type id carried in request frames.
    fn type_id(&self) -> u32;

    /// Handle an inbound request, producing the response payload.
    async fn respond(&self, request: Bytes) -> Result<Bytes>;

    /// Decode a response payload into the value delivered to the
    /// conversation.
    fn consume(&self, payload: Bytes) -> Result<Bytes>;
}
