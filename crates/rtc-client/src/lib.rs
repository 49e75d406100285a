//! Codec-agnostic HTTP transport for the remote task controller.
//!
//! This crate knows how to talk to a worker's `/task/{nodeId}/{taskId}`
//! endpoints — it does not know what a task *is*, or what to do with the
//! `TaskStatus`/`TaskInfo` it gets back. That's `rtc-controller`'s job;
//! this crate just moves bytes and classifies transport-level failures.

pub mod client;
pub mod codec;
pub mod error;
pub mod headers;
pub mod transport;

pub use client::TaskRpcClient;
pub use codec::{BinaryCodec, Codec, JsonCodec};
pub use error::{ClientError, ClientResult};
pub use transport::{ReqwestTransport, RpcMethod, RpcRequest, RpcResponse, RpcTransport};
