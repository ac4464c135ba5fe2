//! Message framing on an established connection.
//!
//! Every frame starts with one tag byte: bit 7 flags a zlib-compressed
//! payload, bits 0-6 select the message kind. Service frames share a common
//! header shape:
//!
//! ```text
//! request:        [tag][service type: u32 BE][conversation id: u64 BE][payload]
//! response/error: [tag][conversation id: u64 BE][payload]
//! ```
//!
//! The kinds are a closed registry; an unregistered id surfaces as
//! [`ClientError::UnknownMessageType`] so the read loop can reject it loudly
//! without dying.

use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;

use crate::conversation::ConversationId;
use crate::error::{ClientError, Result};

/// Bit 7 of the tag byte: payload is zlib-compressed.
pub const COMPRESSED_FLAG: u8 = 0b1000_0000;

/// Bits 0-6 of the tag byte: message kind id.
pub const KIND_MASK: u8 = 0b0111_1111;

/// Registry of message kinds, keyed by tag id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A service request carrying a service type id and conversation id.
    ServiceRequest = 0,
    /// A topic value notification.
    TopicValue = 4,
    /// A topic delta notification.
    TopicDelta = 5,
    /// A service response for one conversation.
    ServiceResponse = 6,
    /// A service error for one conversation.
    ServiceError = 7,
    /// The server aborted the session. No payload.
    Abort = 28,
}

impl MessageKind {
    /// Decode a kind id (tag byte with the compression bit cleared).
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(MessageKind::ServiceRequest),
            4 => Some(MessageKind::TopicValue),
            5 => Some(MessageKind::TopicDelta),
            6 => Some(MessageKind::ServiceResponse),
            7 => Some(MessageKind::ServiceError),
            28 => Some(MessageKind::Abort),
            _ => None,
        }
    }

    /// The kind's tag id.
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Message kind from the tag byte.
    pub kind: MessageKind,
    /// Whether the payload arrived compressed.
    pub compressed: bool,
    /// Payload bytes, inflated when the compression bit was set.
    pub payload: Bytes,
}

impl InboundFrame {
    /// Parse one inbound byte sequence into a frame.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.is_empty() {
            return Err(ClientError::Protocol("Empty frame".to_string()));
        }
        let tag = data[0];
        let compressed = tag & COMPRESSED_FLAG != 0;
        let id = tag & KIND_MASK;
        let kind = MessageKind::from_id(id).ok_or(ClientError::UnknownMessageType(id))?;
        let payload = data.slice(1..);
        let payload = if compressed { inflate(&payload)? } else { payload };
        Ok(Self {
            kind,
            compressed,
            payload,
        })
    }
}

fn inflate(data: &[u8]) -> Result<Bytes> {
    let mut decoder = ZlibDecoder::new(data);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated)?;
    Ok(Bytes::from(inflated))
}

/// Build a service request frame.
pub fn encode_service_request(
    service_type: u32,
    cid: ConversationId,
    payload: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + 4 + 8 + payload.len());
    buf.put_u8(MessageKind::ServiceRequest.id());
    buf.put_u32(service_type);
    buf.put_u64(cid.value());
    buf.put_slice(payload);
    buf.freeze()
}

/// Build a service response frame.
pub fn encode_service_response(cid: ConversationId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + 8 + payload.len());
    buf.put_u8(MessageKind::ServiceResponse.id());
    buf.put_u64(cid.value());
    buf.put_slice(payload);
    buf.freeze()
}

/// Build a service error frame. The message is UTF-8, to the end of frame.
pub fn encode_service_error(cid: ConversationId, message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + 8 + message.len());
    buf.put_u8(MessageKind::ServiceError.id());
    buf.put_u64(cid.value());
    buf.put_slice(message.as_bytes());
    buf.freeze()
}

const ABORT_FRAME: &[u8] = &[MessageKind::Abort as u8];

/// Build an abort frame.
pub fn encode_abort() -> Bytes {
    Bytes::from_static(ABORT_FRAME)
}

/// Decoded service request payload.
#[derive(Debug, Clone)]
pub struct ServiceRequestFrame {
    /// Service type id addressed by the peer.
    pub service_type: u32,
    /// Conversation id the response must echo.
    pub cid: ConversationId,
    /// Service-specific payload.
    pub payload: Bytes,
}

impl ServiceRequestFrame {
    /// Decode the payload of a [`MessageKind::ServiceRequest`] frame.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.remaining() < 12 {
            return Err(ClientError::Protocol(
                "Truncated service request header".to_string(),
            ));
        }
        let service_type = payload.get_u32();
        let cid = ConversationId::new(payload.get_u64());
        Ok(Self {
            service_type,
            cid,
            payload,
        })
    }
}

/// Decoded service response payload.
#[derive(Debug, Clone)]
pub struct ServiceResponseFrame {
    /// Conversation the response resolves.
    pub cid: ConversationId,
    /// Service-specific payload.
    pub payload: Bytes,
}

impl ServiceResponseFrame {
    /// Decode the payload of a [`MessageKind::ServiceResponse`] frame.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.remaining() < 8 {
            return Err(ClientError::Protocol(
                "Truncated service response header".to_string(),
            ));
        }
        let cid = ConversationId::new(payload.get_u64());
        Ok(Self { cid, payload })
    }
}

/// Decoded service error payload.
#[derive(Debug, Clone)]
pub struct ServiceErrorFrame {
    /// Conversation the error fails.
    pub cid: ConversationId,
    /// Error message reported by the peer.
    pub message: String,
}

impl ServiceErrorFrame {
    /// Decode the payload of a [`MessageKind::ServiceError`] frame.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.remaining() < 8 {
            return Err(ClientError::Protocol(
                "Truncated service error header".to_string(),
            ));
        }
        let cid = ConversationId::new(payload.get_u64());
        let message = String::from_utf8(payload.to_vec())
            .map_err(|_| ClientError::Protocol("Service error message is not UTF-8".to_string()))?;
        Ok(Self { cid, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_kind_registry_round_trip() {
        for kind in [
            MessageKind::ServiceRequest,
            MessageKind::TopicValue,
            MessageKind::TopicDelta,
            MessageKind::ServiceResponse,
            MessageKind::ServiceError,
            MessageKind::Abort,
        ] {
            assert_eq!(MessageKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(MessageKind::from_id(1), None);
        assert_eq!(MessageKind::from_id(127), None);
    }

    #[test]
    fn test_parse_plain_frame() {
        let mut data = vec![MessageKind::TopicValue.id()];
        data.extend_from_slice(b"payload");
        let frame = InboundFrame::parse(Bytes::from(data)).unwrap();

        assert_eq!(frame.kind, MessageKind::TopicValue);
        assert!(!frame.compressed);
        assert_eq!(&frame.payload[..], b"payload");
    }

    #[test]
    fn test_parse_compressed_frame_inflates() {
        let original = b"a payload worth compressing, repeated and repeated";
        let mut data = vec![MessageKind::TopicDelta.id() | COMPRESSED_FLAG];
        data.extend_from_slice(&deflate(original));
        let frame = InboundFrame::parse(Bytes::from(data)).unwrap();

        assert_eq!(frame.kind, MessageKind::TopicDelta);
        assert!(frame.compressed);
        assert_eq!(&frame.payload[..], original);
    }

    #[test]
    fn test_parse_corrupt_compressed_payload_fails() {
        let data = vec![MessageKind::TopicValue.id() | COMPRESSED_FLAG, 0xFF, 0xFF];
        assert!(matches!(
            InboundFrame::parse(Bytes::from(data)),
            Err(ClientError::Io(_))
        ));
    }

    #[test]
    fn test_parse_unknown_kind() {
        let data = Bytes::from_static(&[42, 1, 2, 3]);
        match InboundFrame::parse(data) {
            Err(ClientError::UnknownMessageType(id)) => assert_eq!(id, 42),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_frame() {
        assert!(matches!(
            InboundFrame::parse(Bytes::new()),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_service_request_layout() {
        let frame = encode_service_request(0x0102, ConversationId::new(7), b"req");

        assert_eq!(frame[0], 0);
        assert_eq!(&frame[1..5], &0x0102u32.to_be_bytes());
        assert_eq!(&frame[5..13], &7u64.to_be_bytes());
        assert_eq!(&frame[13..], b"req");
    }

    #[test]
    fn test_service_request_round_trip() {
        let encoded = encode_service_request(88, ConversationId::new(1234), b"body");
        let frame = InboundFrame::parse(encoded).unwrap();
        assert_eq!(frame.kind, MessageKind::ServiceRequest);

        let request = ServiceRequestFrame::decode(frame.payload).unwrap();
        assert_eq!(request.service_type, 88);
        assert_eq!(request.cid, ConversationId::new(1234));
        assert_eq!(&request.payload[..], b"body");
    }

    #[test]
    fn test_service_response_round_trip() {
        let encoded = encode_service_response(ConversationId::new(7), b"value");
        assert_eq!(encoded[0], 6);
        assert_eq!(&encoded[1..9], &7u64.to_be_bytes());

        let frame = InboundFrame::parse(encoded).unwrap();
        let response = ServiceResponseFrame::decode(frame.payload).unwrap();
        assert_eq!(response.cid, ConversationId::new(7));
        assert_eq!(&response.payload[..], b"value");
    }

    #[test]
    fn test_service_error_round_trip() {
        let encoded = encode_service_error(ConversationId::new(9), "no such topic");
        let frame = InboundFrame::parse(encoded).unwrap();
        assert_eq!(frame.kind, MessageKind::ServiceError);

        let error = ServiceErrorFrame::decode(frame.payload).unwrap();
        assert_eq!(error.cid, ConversationId::new(9));
        assert_eq!(error.message, "no such topic");
    }

    #[test]
    fn test_service_error_rejects_invalid_utf8() {
        let mut data = BytesMut::new();
        data.put_u64(9);
        data.put_slice(&[0xFF, 0xFE]);
        assert!(matches!(
            ServiceErrorFrame::decode(data.freeze()),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_headers_rejected() {
        assert!(ServiceRequestFrame::decode(Bytes::from_static(&[0; 11])).is_err());
        assert!(ServiceResponseFrame::decode(Bytes::from_static(&[0; 7])).is_err());
        assert!(ServiceErrorFrame::decode(Bytes::from_static(&[0; 7])).is_err());
    }

    #[test]
    fn test_abort_frame_has_no_payload() {
        let encoded = encode_abort();
        assert_eq!(&encoded[..], &[28]);

        let frame = InboundFrame::parse(encoded).unwrap();
        assert_eq!(frame.kind, MessageKind::Abort);
        assert!(frame.payload.is_empty());
    }
}
