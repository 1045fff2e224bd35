//! Containerizer capability interface.
//!
//! The actual process/cgroup/namespace mechanics live outside this agent;
//! the control plane consumes them through the [`Containerizer`] trait. Its
//! contract: launching onto an occupied container id is rejected by the
//! implementation, and destroy/wait are safe to call concurrently.

pub mod remote;

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::watch;

use crate::api::content_type::ContentType;
use crate::api::types::{CommandInfo, ContainerId, ContainerInfo};
use crate::io::pipe::Reader;

pub use remote::RemoteContainerizer;

/// Failure inside the containerizer or on the path to it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("containerizer: {0}")]
pub struct ContainerizerError(pub String);

/// Class of a nested container: sessions launch DEBUG containers, which
/// share their parent's resources instead of getting their own allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerClass {
    Default,
    Debug,
}

impl ContainerClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerClass::Default => "DEFAULT",
            ContainerClass::Debug => "DEBUG",
        }
    }
}

/// How a container terminated, as reported by `wait`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerTermination {
    pub exit_status: Option<i32>,
    pub message: Option<String>,
}

/// Request sent over an attach connection to a container's I/O switchboard.
pub struct IoRequest {
    pub content_type: ContentType,
    pub accept: ContentType,
    pub body: IoRequestBody,
}

pub enum IoRequestBody {
    /// One fully-buffered message (attach-output).
    Full(Bytes),
    /// A streamed frame sequence (attach-input).
    Streaming(Reader),
}

/// Response from the switchboard; the body streams for as long as the
/// container produces output.
pub struct IoResponse {
    pub ok: bool,
    pub body: Reader,
}

pub type SendFuture = Pin<Box<dyn Future<Output = Result<IoResponse, ContainerizerError>> + Send>>;
type SendFn = Box<dyn FnOnce(IoRequest) -> SendFuture + Send>;

/// A single-use (non-keep-alive) connection to a container's I/O
/// switchboard. `send` consumes the connection; the disconnect watch stays
/// valid afterwards so teardown can observe the peer going away.
pub struct IoConnection {
    send: SendFn,
    disconnected: watch::Receiver<bool>,
}

impl IoConnection {
    pub fn new(
        send: impl FnOnce(IoRequest) -> SendFuture + Send + 'static,
        disconnected: watch::Receiver<bool>,
    ) -> Self {
        Self {
            send: Box::new(send),
            disconnected,
        }
    }

    /// Send the one request this connection carries.
    pub async fn send(self, request: IoRequest) -> Result<IoResponse, ContainerizerError> {
        (self.send)(request).await
    }

    /// A watch on the connection's liveness, taken before `send` consumes
    /// the connection. Must be held until teardown so the notification is
    /// observed rather than leaked.
    pub fn disconnected(&self) -> Disconnected {
        Disconnected {
            rx: self.disconnected.clone(),
        }
    }
}

/// Resolves when the switchboard connection goes away.
pub struct Disconnected {
    rx: watch::Receiver<bool>,
}

impl Disconnected {
    pub async fn wait(mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// External capability interface for container lifecycle operations.
#[async_trait]
pub trait Containerizer: Send + Sync {
    /// Launch a nested container. `Ok(false)` means the launch was rejected
    /// because the provided `ContainerInfo` is unsupported; nothing was
    /// created in that case.
    async fn launch(
        &self,
        container_id: &ContainerId,
        command: &CommandInfo,
        container: Option<&ContainerInfo>,
        user: Option<&str>,
        class: ContainerClass,
    ) -> Result<bool, ContainerizerError>;

    /// Destroy a container. `Ok(false)` means it was not found, which does
    /// not distinguish "never existed" from "already destroyed".
    async fn destroy(&self, container_id: &ContainerId) -> Result<bool, ContainerizerError>;

    /// Wait for a container's termination. `Ok(None)` means the container
    /// is unknown or has not terminated.
    async fn wait(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<ContainerTermination>, ContainerizerError>;

    /// Open a single-use connection to the container's I/O switchboard.
    async fn attach(&self, container_id: &ContainerId) -> Result<IoConnection, ContainerizerError>;
}
