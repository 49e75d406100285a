//! Wire codecs for the four remote-task messages.
//!
//! Two codecs are supported, per §6 of the controller's external-interface
//! contract: a compact binary framing (preferred on the wire) and a textual
//! JSON framing (always accepted in replies). Both round-trip the same
//! logical objects — `rtc-client` is agnostic about which one a given
//! deployment picks, it just needs `Accept`/`Content-Type` to agree with
//! whatever the worker understands.

use std::fmt;

use rtc_shared::model::{TaskInfo, TaskStatus, TaskUpdateRequest};

use crate::error::{ClientError, ClientResult};

/// Round-trips the controller's wire messages to and from bytes, and names
/// the MIME types to negotiate with.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Value sent in `Content-Type` / `Accept` headers for this codec.
    fn media_type(&self) -> &'static str;

    fn encode_update_request(&self, request: &TaskUpdateRequest) -> ClientResult<Vec<u8>>;
    fn decode_status(&self, body: &[u8]) -> ClientResult<TaskStatus>;
    fn decode_info(&self, body: &[u8]) -> ClientResult<TaskInfo>;
}

/// Textual JSON framing. The fallback every worker is assumed to accept.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn media_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_update_request(&self, request: &TaskUpdateRequest) -> ClientResult<Vec<u8>> {
        serde_json::to_vec(request).map_err(|e| ClientError::Encode(e.to_string()))
    }

    fn decode_status(&self, body: &[u8]) -> ClientResult<TaskStatus> {
        serde_json::from_slice(body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn decode_info(&self, body: &[u8]) -> ClientResult<TaskInfo> {
        serde_json::from_slice(body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Compact binary framing, preferred on the wire when the worker supports
/// it. Built on `bincode` rather than a protobuf/IDL toolchain since the
/// controller doesn't own the wire format (§7 non-goals) and has no need
/// for cross-language schema evolution here — just a denser encoding of
/// the same `serde`-derived types `JsonCodec` already round-trips.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn media_type(&self) -> &'static str {
        "application/x-rtc-binary"
    }

    fn encode_update_request(&self, request: &TaskUpdateRequest) -> ClientResult<Vec<u8>> {
        bincode::serialize(request).map_err(|e| ClientError::Encode(e.to_string()))
    }

    fn decode_status(&self, body: &[u8]) -> ClientResult<TaskStatus> {
        bincode::deserialize(body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn decode_info(&self, body: &[u8]) -> ClientResult<TaskInfo> {
        bincode::deserialize(body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
