//! Domain-level facade over [`RpcTransport`] + [`Codec`] for the four
//! task endpoints.
//!
//! Mirrors the shape of `tasker-shared`'s `MessageClient`: a thin struct
//! wrapping a transport and a routing/framing concern, exposing
//! convenience methods per logical operation rather than making every
//! caller build `RpcRequest`s by hand.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use rtc_shared::model::{TaskInfo, TaskState, TaskStatus, TaskUpdateRequest};

use crate::codec::Codec;
use crate::error::ClientResult;
use crate::headers;
use crate::transport::{RpcRequest, RpcTransport};

/// Talks to exactly one task's endpoints on one worker.
///
/// Cheap to clone (an `Arc`-wrapped transport and codec underneath); the
/// controller creates one per `TaskHandle`.
#[derive(Debug, Clone)]
pub struct TaskRpcClient {
    transport: Arc<dyn RpcTransport>,
    codec: Arc<dyn Codec>,
    task_uri: Url,
}

impl TaskRpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>, codec: Arc<dyn Codec>, task_uri: Url) -> Self {
        Self {
            transport,
            codec,
            task_uri,
        }
    }

    pub fn task_uri(&self) -> &Url {
        &self.task_uri
    }

    fn status_uri(&self) -> Url {
        let mut uri = self.task_uri.clone();
        let path = format!("{}/status", uri.path().trim_end_matches('/'));
        uri.set_path(&path);
        uri
    }

    /// `GET {taskUri}/status` — the high-frequency long-poll.
    pub async fn fetch_status(
        &self,
        current_state: TaskState,
        max_wait: Duration,
    ) -> ClientResult<TaskStatus> {
        let request = RpcRequest::get(self.status_uri())
            .with_header(headers::CURRENT_STATE, headers::current_state_value(current_state))
            .with_header(headers::MAX_WAIT, headers::max_wait_value(max_wait))
            .with_header("Accept", self.codec.media_type())
            .with_timeout(max_wait + Duration::from_secs(5));

        let body = self.transport.execute(request).await?.into_result()?;
        self.codec.decode_status(&body)
    }

    /// `GET {taskUri}` — the low-frequency long-poll for the full `TaskInfo`.
    pub async fn fetch_info(
        &self,
        current_state: TaskState,
        max_wait: Duration,
    ) -> ClientResult<TaskInfo> {
        let request = RpcRequest::get(self.task_uri.clone())
            .with_header(headers::CURRENT_STATE, headers::current_state_value(current_state))
            .with_header(headers::MAX_WAIT, headers::max_wait_value(max_wait))
            .with_header("Accept", self.codec.media_type())
            .with_timeout(max_wait + Duration::from_secs(5));

        let body = self.transport.execute(request).await?.into_result()?;
        self.codec.decode_info(&body)
    }

    /// `POST {taskUri}` — push local intent, get back the worker's
    /// resulting `TaskInfo`.
    pub async fn send_update(&self, update: &TaskUpdateRequest) -> ClientResult<TaskInfo> {
        let body = self.codec.encode_update_request(update)?;
        let request = RpcRequest::post(self.task_uri.clone(), body)
            .with_header("Content-Type", self.codec.media_type())
            .with_header("Accept", self.codec.media_type());

        let body = self.transport.execute(request).await?.into_result()?;
        self.codec.decode_info(&body)
    }

    /// `DELETE {taskUri}?abort={true|false}` — terminate the task.
    pub async fn terminate(&self, abort: bool) -> ClientResult<TaskInfo> {
        let mut uri = self.task_uri.clone();
        uri.query_pairs_mut()
            .append_pair("abort", if abort { "true" } else { "false" });
        let request = RpcRequest::delete(uri).with_header("Accept", self.codec.media_type());

        let body = self.transport.execute(request).await?.into_result()?;
        self.codec.decode_info(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use rtc_shared::model::{BufferType, OutputBuffers};

    fn sample_info() -> TaskInfo {
        use rtc_shared::model::{TaskId, TaskInstanceId};
        TaskInfo::synthesized(
            TaskStatus::planned(
                TaskId::new("q", 0, 0, 0),
                TaskInstanceId::from("i"),
                "http://worker/task/1",
            ),
            OutputBuffers::empty(BufferType::Partitioned),
        )
    }

    #[tokio::test]
    async fn fetch_status_sends_long_poll_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/task/1/status")
            .match_header(headers::CURRENT_STATE, "RUNNING")
            .match_header(headers::MAX_WAIT, "2s")
            .with_status(200)
            .with_body(
                serde_json::to_string(&TaskStatus::planned(
                    rtc_shared::model::TaskId::new("q", 0, 0, 0),
                    rtc_shared::model::TaskInstanceId::from("i"),
                    "http://worker/task/1",
                ))
                .unwrap(),
            )
            .create_async()
            .await;

        let transport = Arc::new(crate::transport::ReqwestTransport::new(Duration::from_secs(5)).unwrap());
        let uri = Url::parse(&format!("{}/task/1", server.url())).unwrap();
        let client = TaskRpcClient::new(transport, Arc::new(JsonCodec), uri);

        let status = client
            .fetch_status(TaskState::Running, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(status.state, TaskState::Planned);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn terminate_carries_abort_query_param() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/task/1")
            .match_query(mockito::Matcher::UrlEncoded("abort".into(), "true".into()))
            .with_status(200)
            .with_body(serde_json::to_string(&sample_info()).unwrap())
            .create_async()
            .await;

        let transport = Arc::new(crate::transport::ReqwestTransport::new(Duration::from_secs(5)).unwrap());
        let uri = Url::parse(&format!("{}/task/1", server.url())).unwrap();
        let client = TaskRpcClient::new(transport, Arc::new(JsonCodec), uri);

        client.terminate(true).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_update_posts_encoded_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/task/1")
            .match_header("Content-Type", "application/json")
            .with_status(200)
            .with_body(serde_json::to_string(&sample_info()).unwrap())
            .create_async()
            .await;

        let transport = Arc::new(crate::transport::ReqwestTransport::new(Duration::from_secs(5)).unwrap());
        let uri = Url::parse(&format!("{}/task/1", server.url())).unwrap();
        let client = TaskRpcClient::new(transport, Arc::new(JsonCodec), uri);

        let update = TaskUpdateRequest {
            session: serde_json::json!({}),
            fragment: None,
            sources: Vec::new(),
            output_buffers: OutputBuffers::empty(BufferType::Partitioned),
            total_partitions: 1,
        };
        client.send_update(&update).await.unwrap();
        mock.assert_async().await;
    }
}
