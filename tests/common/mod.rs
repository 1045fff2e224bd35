//! Shared utilities for the integration tests: an in-process agent on an
//! ephemeral port, a programmable mock containerizer, and scripted
//! authorizers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};

use nested_agent::api::types::{
    CommandInfo, ContainerId, ContainerInfo, ExecutorId, ExecutorInfo, FrameworkId,
    FrameworkInfo,
};
use nested_agent::api::HttpServer;
use nested_agent::auth::{
    Action, AuthObject, AuthorizationError, Authorizer, ObjectApprover, Subject,
};
use nested_agent::config::AgentConfig;
use nested_agent::containerizer::{
    ContainerClass, Containerizer, ContainerizerError, ContainerTermination, IoConnection,
    IoRequest, IoResponse,
};
use nested_agent::io::pipe::Reader;
use nested_agent::io::recordio::FrameDecoder;
use nested_agent::lifecycle::Shutdown;
use nested_agent::state::Registry;

/// One attach connection's request, surfaced to the test to script the
/// switchboard side.
pub struct AttachRequest {
    pub container_id: ContainerId,
    pub request: IoRequest,
    pub respond: oneshot::Sender<Result<IoResponse, ContainerizerError>>,
}

/// A recorded launch invocation.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub container_id: ContainerId,
    pub user: Option<String>,
    pub class: ContainerClass,
}

/// Programmable containerizer. Scripted results are popped per call; when
/// a queue is empty the call succeeds with a benign default.
pub struct MockContainerizer {
    pub launch_results: Mutex<VecDeque<Result<bool, ContainerizerError>>>,
    pub destroy_results: Mutex<VecDeque<Result<bool, ContainerizerError>>>,
    pub wait_results: Mutex<VecDeque<Result<Option<ContainerTermination>, ContainerizerError>>>,
    pub launches: Mutex<Vec<LaunchRecord>>,
    pub destroys: Mutex<Vec<ContainerId>>,
    pub attach_ok: AtomicBool,
    attach_tx: mpsc::UnboundedSender<AttachRequest>,
    attach_watches: Mutex<Vec<watch::Sender<bool>>>,
}

pub fn mock_containerizer() -> (Arc<MockContainerizer>, mpsc::UnboundedReceiver<AttachRequest>) {
    let (attach_tx, attach_rx) = mpsc::unbounded_channel();
    let mock = Arc::new(MockContainerizer {
        launch_results: Mutex::new(VecDeque::new()),
        destroy_results: Mutex::new(VecDeque::new()),
        wait_results: Mutex::new(VecDeque::new()),
        launches: Mutex::new(Vec::new()),
        destroys: Mutex::new(Vec::new()),
        attach_ok: AtomicBool::new(true),
        attach_tx,
        attach_watches: Mutex::new(Vec::new()),
    });
    (mock, attach_rx)
}

impl MockContainerizer {
    pub fn push_launch(&self, result: Result<bool, ContainerizerError>) {
        self.launch_results.lock().unwrap().push_back(result);
    }

    pub fn push_destroy(&self, result: Result<bool, ContainerizerError>) {
        self.destroy_results.lock().unwrap().push_back(result);
    }

    pub fn push_wait(&self, result: Result<Option<ContainerTermination>, ContainerizerError>) {
        self.wait_results.lock().unwrap().push_back(result);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn destroys_of(&self, id: &ContainerId) -> usize {
        self.destroys.lock().unwrap().iter().filter(|d| *d == id).count()
    }
}

#[async_trait]
impl Containerizer for MockContainerizer {
    async fn launch(
        &self,
        container_id: &ContainerId,
        _command: &CommandInfo,
        _container: Option<&ContainerInfo>,
        user: Option<&str>,
        class: ContainerClass,
    ) -> Result<bool, ContainerizerError> {
        self.launches.lock().unwrap().push(LaunchRecord {
            container_id: container_id.clone(),
            user: user.map(str::to_owned),
            class,
        });
        self.launch_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(true))
    }

    async fn destroy(&self, container_id: &ContainerId) -> Result<bool, ContainerizerError> {
        self.destroys.lock().unwrap().push(container_id.clone());
        self.destroy_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(true))
    }

    async fn wait(
        &self,
        _container_id: &ContainerId,
    ) -> Result<Option<ContainerTermination>, ContainerizerError> {
        self.wait_results.lock().unwrap().pop_front().unwrap_or(Ok(Some(
            ContainerTermination {
                exit_status: Some(0),
                message: None,
            },
        )))
    }

    async fn attach(&self, container_id: &ContainerId) -> Result<IoConnection, ContainerizerError> {
        if !self.attach_ok.load(Ordering::SeqCst) {
            return Err(ContainerizerError("attach refused".into()));
        }

        let (disconnect_tx, disconnect_rx) = watch::channel(false);
        self.attach_watches.lock().unwrap().push(disconnect_tx);

        let tx = self.attach_tx.clone();
        let container_id = container_id.clone();
        let send = move |request: IoRequest| -> nested_agent::containerizer::SendFuture {
            Box::pin(async move {
                let (respond, reply) = oneshot::channel();
                tx.send(AttachRequest {
                    container_id,
                    request,
                    respond,
                })
                .map_err(|_| ContainerizerError("switchboard gone".into()))?;
                reply
                    .await
                    .map_err(|_| ContainerizerError("switchboard dropped request".into()))?
            })
        };

        Ok(IoConnection::new(send, disconnect_rx))
    }
}

/// Approver/authorizer scripted per test.
pub struct StaticAuthorizer {
    pub allow: bool,
}

struct StaticApprover {
    allow: bool,
}

impl ObjectApprover for StaticApprover {
    fn approved(&self, _object: &AuthObject) -> Result<bool, AuthorizationError> {
        Ok(self.allow)
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn get_object_approver(
        &self,
        _subject: Subject,
        _action: Action,
    ) -> Result<Box<dyn ObjectApprover>, AuthorizationError> {
        Ok(Box::new(StaticApprover { allow: self.allow }))
    }
}

/// Authorizer whose approvers always fail to evaluate.
pub struct BrokenAuthorizer;

struct BrokenApprover;

impl ObjectApprover for BrokenApprover {
    fn approved(&self, _object: &AuthObject) -> Result<bool, AuthorizationError> {
        Err(AuthorizationError("evaluation backend down".into()))
    }
}

#[async_trait]
impl Authorizer for BrokenAuthorizer {
    async fn get_object_approver(
        &self,
        _subject: Subject,
        _action: Action,
    ) -> Result<Box<dyn ObjectApprover>, AuthorizationError> {
        Ok(Box::new(BrokenApprover))
    }
}

/// An agent running in-process on an ephemeral port.
pub struct TestAgent {
    pub addr: SocketAddr,
    pub registry: Registry,
    pub containerizer: Arc<MockContainerizer>,
    pub attach_rx: mpsc::UnboundedReceiver<AttachRequest>,
    pub client: reqwest::Client,
    _shutdown: Shutdown,
}

pub async fn spawn_agent(authorizer: Option<Arc<dyn Authorizer>>) -> TestAgent {
    spawn_agent_with(authorizer, true).await
}

pub async fn spawn_agent_with(
    authorizer: Option<Arc<dyn Authorizer>>,
    recovered: bool,
) -> TestAgent {
    let (containerizer, attach_rx) = mock_containerizer();
    let registry = Registry::spawn();
    if recovered {
        registry.mark_recovered();
    }

    let server = HttpServer::new(
        AgentConfig::default(),
        registry.clone(),
        containerizer.clone(),
        authorizer,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    TestAgent {
        addr,
        registry,
        containerizer,
        attach_rx,
        client: reqwest::Client::new(),
        _shutdown: shutdown,
    }
}

impl TestAgent {
    pub fn api_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn executor_url(&self) -> String {
        format!("http://{}/api/v1/executor", self.addr)
    }

    /// POST a JSON call with JSON accept.
    pub async fn post_json(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.api_url())
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

/// Register an executor whose container is `container`, the way a SUBSCRIBE
/// would.
pub async fn register_executor(registry: &Registry, executor_id: &str, container: &str) {
    registry
        .register_executor(
            FrameworkInfo {
                id: Some(FrameworkId { value: "f1".into() }),
                name: "framework-1".into(),
                user: "agent".into(),
                principal: None,
            },
            ExecutorInfo {
                executor_id: Some(ExecutorId {
                    value: executor_id.into(),
                }),
                framework_id: Some(FrameworkId { value: "f1".into() }),
                name: None,
                command: None,
            },
            ContainerId::new(container),
            Some("ops".into()),
        )
        .await
        .unwrap();
}

pub fn launch_call(id: &str, parent: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "LAUNCH_NESTED_CONTAINER",
        "launch_nested_container": {
            "container_id": {"value": id, "parent": {"value": parent}},
            "command": {"shell": true, "value": "ls"}
        }
    })
}

pub fn session_call(id: &str, parent: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "LAUNCH_NESTED_CONTAINER_SESSION",
        "launch_nested_container_session": {
            "container_id": {"value": id, "parent": {"value": parent}},
            "command": {"shell": true, "value": "cat"}
        }
    })
}

pub fn wait_call(id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "WAIT_NESTED_CONTAINER",
        "wait_nested_container": {"container_id": {"value": id}}
    })
}

pub fn kill_call(id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "KILL_NESTED_CONTAINER",
        "kill_nested_container": {"container_id": {"value": id}}
    })
}

/// Drain a pipe reader into frames.
pub async fn read_frames(reader: &mut Reader) -> Vec<Bytes> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    while let Some(chunk) = reader.read().await {
        frames.extend(decoder.decode(&chunk.unwrap()).unwrap());
    }
    frames
}

/// Poll until `condition` holds, failing the test after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}
