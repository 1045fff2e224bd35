//! Containerizer backed by a runtime daemon over HTTP.
//!
//! # Responsibilities
//! - Forward launch/destroy/wait as JSON requests to the runtime endpoint
//! - Open attach connections whose bodies stream in both directions
//!
//! The attach path mirrors the switchboard contract: one POST per
//! connection, the request body carrying streamed input or the response
//! body carrying streamed output, with no keep-alive.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode, Uri};
use futures_util::StreamExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use crate::api::types::{CommandInfo, ContainerId, ContainerInfo};
use crate::io::pipe;

use super::{
    ContainerClass, Containerizer, ContainerizerError, ContainerTermination, IoConnection,
    IoRequest, IoRequestBody, IoResponse,
};

/// Cap on buffered runtime replies; attach bodies are never buffered.
const MAX_REPLY_BYTES: usize = 1024 * 1024;

pub struct RemoteContainerizer {
    client: Client<HttpConnector, Body>,
    endpoint: Url,
}

#[derive(Serialize)]
struct LaunchRequest<'a> {
    container_id: &'a ContainerId,
    command: &'a CommandInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<&'a ContainerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    class: &'static str,
}

#[derive(Deserialize)]
struct LaunchReply {
    launched: bool,
}

#[derive(Serialize)]
struct ContainerRequest<'a> {
    container_id: &'a ContainerId,
}

#[derive(Deserialize)]
struct DestroyReply {
    found: bool,
}

#[derive(Deserialize)]
struct WaitReply {
    termination: Option<TerminationReply>,
}

#[derive(Deserialize)]
struct TerminationReply {
    exit_status: Option<i32>,
    message: Option<String>,
}

impl RemoteContainerizer {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            endpoint,
        }
    }

    fn uri(&self, path: &str) -> Result<Uri, ContainerizerError> {
        let url = self
            .endpoint
            .join(path)
            .map_err(|e| ContainerizerError(format!("bad runtime endpoint: {e}")))?;
        url.as_str()
            .parse()
            .map_err(|e| ContainerizerError(format!("bad runtime endpoint: {e}")))
    }

    async fn post_json<Req: Serialize, Reply: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Reply, ContainerizerError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| ContainerizerError(format!("failed to encode request: {e}")))?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri(path)?)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| ContainerizerError(format!("failed to build request: {e}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ContainerizerError(format!("runtime request failed: {e}")))?;

        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_REPLY_BYTES)
            .await
            .map_err(|e| ContainerizerError(format!("failed to read runtime reply: {e}")))?;

        if status != StatusCode::OK {
            return Err(ContainerizerError(format!(
                "runtime returned {}: {}",
                status,
                String::from_utf8_lossy(&bytes)
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ContainerizerError(format!("malformed runtime reply: {e}")))
    }
}

#[async_trait::async_trait]
impl Containerizer for RemoteContainerizer {
    async fn launch(
        &self,
        container_id: &ContainerId,
        command: &CommandInfo,
        container: Option<&ContainerInfo>,
        user: Option<&str>,
        class: ContainerClass,
    ) -> Result<bool, ContainerizerError> {
        let reply: LaunchReply = self
            .post_json(
                "containers/launch",
                &LaunchRequest {
                    container_id,
                    command,
                    container,
                    user,
                    class: class.as_str(),
                },
            )
            .await?;
        Ok(reply.launched)
    }

    async fn destroy(&self, container_id: &ContainerId) -> Result<bool, ContainerizerError> {
        let reply: DestroyReply = self
            .post_json("containers/destroy", &ContainerRequest { container_id })
            .await?;
        Ok(reply.found)
    }

    async fn wait(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<ContainerTermination>, ContainerizerError> {
        let reply: WaitReply = self
            .post_json("containers/wait", &ContainerRequest { container_id })
            .await?;
        Ok(reply.termination.map(|t| ContainerTermination {
            exit_status: t.exit_status,
            message: t.message,
        }))
    }

    async fn attach(
        &self,
        container_id: &ContainerId,
    ) -> Result<IoConnection, ContainerizerError> {
        let uri = self.uri(&format!("containers/{}/attach", container_id.value))?;
        let client = self.client.clone();
        let (disconnected_tx, disconnected_rx) = watch::channel(false);

        let send = move |io_request: IoRequest| -> super::SendFuture {
            Box::pin(async move {
                let body = match io_request.body {
                    IoRequestBody::Full(bytes) => Body::from(bytes),
                    IoRequestBody::Streaming(reader) => Body::from_stream(reader.into_stream()),
                };

                let request = Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, io_request.content_type.as_media_type())
                    .header(header::ACCEPT, io_request.accept.as_media_type())
                    .body(body)
                    .map_err(|e| ContainerizerError(format!("failed to build request: {e}")))?;

                let response = match client.request(request).await {
                    Ok(response) => response,
                    Err(error) => {
                        let _ = disconnected_tx.send(true);
                        return Err(ContainerizerError(format!(
                            "attach connection failed: {error}"
                        )));
                    }
                };

                let ok = response.status() == StatusCode::OK;
                let (mut writer, reader) = pipe::pipe();
                let body: hyper::body::Incoming = response.into_body();
                let mut data = Body::new(body).into_data_stream();

                tokio::spawn(async move {
                    loop {
                        match data.next().await {
                            Some(Ok(chunk)) => {
                                if writer.write(chunk).await.is_err() {
                                    break;
                                }
                            }
                            Some(Err(error)) => {
                                writer.fail(format!("attach body failed: {error}"));
                                break;
                            }
                            None => {
                                writer.close();
                                break;
                            }
                        }
                    }
                    let _ = disconnected_tx.send(true);
                });

                Ok(IoResponse { ok, body: reader })
            })
        };

        Ok(IoConnection::new(send, disconnected_rx))
    }
}
