//! Versioned external API schema.
//!
//! These are the envelopes callers put on the wire. They are deliberately
//! loose (every payload optional, protobuf-style); the conversion into the
//! internal [`Call`](super::call::Call) model is where presence rules are
//! enforced.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::content_type::ContentType;
use super::types::{
    base64_bytes, wire_enum_serde, ContainerId, ContainerInfo, ContainerSummary, CommandInfo,
    ExecutorId, ExecutorInfo, Flag, FrameworkId, FrameworkInfo, ProcessIo, Task, TaskStatus,
    VersionInfo,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum CallType {
    Unknown = 0,
    GetHealth = 1,
    GetVersion = 2,
    GetFlags = 3,
    GetFrameworks = 4,
    GetExecutors = 5,
    GetTasks = 6,
    GetContainers = 7,
    LaunchNestedContainer = 8,
    WaitNestedContainer = 9,
    KillNestedContainer = 10,
    LaunchNestedContainerSession = 11,
    AttachContainerInput = 12,
    AttachContainerOutput = 13,
}

impl CallType {
    pub fn wire_name(self) -> &'static str {
        match self {
            CallType::Unknown => "UNKNOWN",
            CallType::GetHealth => "GET_HEALTH",
            CallType::GetVersion => "GET_VERSION",
            CallType::GetFlags => "GET_FLAGS",
            CallType::GetFrameworks => "GET_FRAMEWORKS",
            CallType::GetExecutors => "GET_EXECUTORS",
            CallType::GetTasks => "GET_TASKS",
            CallType::GetContainers => "GET_CONTAINERS",
            CallType::LaunchNestedContainer => "LAUNCH_NESTED_CONTAINER",
            CallType::WaitNestedContainer => "WAIT_NESTED_CONTAINER",
            CallType::KillNestedContainer => "KILL_NESTED_CONTAINER",
            CallType::LaunchNestedContainerSession => "LAUNCH_NESTED_CONTAINER_SESSION",
            CallType::AttachContainerInput => "ATTACH_CONTAINER_INPUT",
            CallType::AttachContainerOutput => "ATTACH_CONTAINER_OUTPUT",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(CallType::Unknown),
            "GET_HEALTH" => Some(CallType::GetHealth),
            "GET_VERSION" => Some(CallType::GetVersion),
            "GET_FLAGS" => Some(CallType::GetFlags),
            "GET_FRAMEWORKS" => Some(CallType::GetFrameworks),
            "GET_EXECUTORS" => Some(CallType::GetExecutors),
            "GET_TASKS" => Some(CallType::GetTasks),
            "GET_CONTAINERS" => Some(CallType::GetContainers),
            "LAUNCH_NESTED_CONTAINER" => Some(CallType::LaunchNestedContainer),
            "WAIT_NESTED_CONTAINER" => Some(CallType::WaitNestedContainer),
            "KILL_NESTED_CONTAINER" => Some(CallType::KillNestedContainer),
            "LAUNCH_NESTED_CONTAINER_SESSION" => Some(CallType::LaunchNestedContainerSession),
            "ATTACH_CONTAINER_INPUT" => Some(CallType::AttachContainerInput),
            "ATTACH_CONTAINER_OUTPUT" => Some(CallType::AttachContainerOutput),
            _ => None,
        }
    }
}

wire_enum_serde!(call_type_wire, super::CallType);

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchNestedContainer {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandInfo>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitNestedContainer {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct KillNestedContainer {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum AttachInputKind {
    Unknown = 0,
    ContainerId = 1,
    ProcessIo = 2,
}

impl AttachInputKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            AttachInputKind::Unknown => "UNKNOWN",
            AttachInputKind::ContainerId => "CONTAINER_ID",
            AttachInputKind::ProcessIo => "PROCESS_IO",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(AttachInputKind::Unknown),
            "CONTAINER_ID" => Some(AttachInputKind::ContainerId),
            "PROCESS_IO" => Some(AttachInputKind::ProcessIo),
            _ => None,
        }
    }
}

wire_enum_serde!(attach_input_kind_wire, super::AttachInputKind);

/// Streamed attach-input record: the first record of a stream carries the
/// container id, every subsequent record carries process I/O.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachContainerInput {
    #[prost(enumeration = "AttachInputKind", tag = "1")]
    #[serde(rename = "type", with = "attach_input_kind_wire")]
    pub kind: i32,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_io: Option<ProcessIo>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachContainerOutput {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
}

/// External call envelope.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Call {
    #[prost(enumeration = "CallType", tag = "1")]
    #[serde(rename = "type", with = "call_type_wire")]
    pub r#type: i32,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_nested_container: Option<LaunchNestedContainer>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_nested_container: Option<WaitNestedContainer>,

    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_nested_container: Option<KillNestedContainer>,

    #[prost(message, optional, tag = "5")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_nested_container_session: Option<LaunchNestedContainer>,

    #[prost(message, optional, tag = "6")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_container_input: Option<AttachContainerInput>,

    #[prost(message, optional, tag = "7")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_container_output: Option<AttachContainerOutput>,
}

impl Call {
    pub fn call_type(&self) -> CallType {
        CallType::try_from(self.r#type).unwrap_or(CallType::Unknown)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ResponseType {
    Unknown = 0,
    GetHealth = 1,
    GetVersion = 2,
    GetFlags = 3,
    GetFrameworks = 4,
    GetExecutors = 5,
    GetTasks = 6,
    GetContainers = 7,
    WaitNestedContainer = 8,
}

impl ResponseType {
    pub fn wire_name(self) -> &'static str {
        match self {
            ResponseType::Unknown => "UNKNOWN",
            ResponseType::GetHealth => "GET_HEALTH",
            ResponseType::GetVersion => "GET_VERSION",
            ResponseType::GetFlags => "GET_FLAGS",
            ResponseType::GetFrameworks => "GET_FRAMEWORKS",
            ResponseType::GetExecutors => "GET_EXECUTORS",
            ResponseType::GetTasks => "GET_TASKS",
            ResponseType::GetContainers => "GET_CONTAINERS",
            ResponseType::WaitNestedContainer => "WAIT_NESTED_CONTAINER",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(ResponseType::Unknown),
            "GET_HEALTH" => Some(ResponseType::GetHealth),
            "GET_VERSION" => Some(ResponseType::GetVersion),
            "GET_FLAGS" => Some(ResponseType::GetFlags),
            "GET_FRAMEWORKS" => Some(ResponseType::GetFrameworks),
            "GET_EXECUTORS" => Some(ResponseType::GetExecutors),
            "GET_TASKS" => Some(ResponseType::GetTasks),
            "GET_CONTAINERS" => Some(ResponseType::GetContainers),
            "WAIT_NESTED_CONTAINER" => Some(ResponseType::WaitNestedContainer),
            _ => None,
        }
    }
}

wire_enum_serde!(response_type_wire, super::ResponseType);

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetHealth {
    #[prost(bool, tag = "1")]
    pub healthy: bool,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetVersion {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_info: Option<VersionInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetFlags {
    #[prost(message, repeated, tag = "1")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<Flag>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetFrameworks {
    #[prost(message, repeated, tag = "1")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<FrameworkInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetExecutors {
    #[prost(message, repeated, tag = "1")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub executors: Vec<ExecutorInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetTasks {
    #[prost(message, repeated, tag = "1")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetContainers {
    #[prost(message, repeated, tag = "1")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerSummary>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitNestedContainerResponse {
    #[prost(int32, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
}

/// External response envelope.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    #[prost(enumeration = "ResponseType", tag = "1")]
    #[serde(rename = "type", with = "response_type_wire")]
    pub r#type: i32,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_health: Option<GetHealth>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_version: Option<GetVersion>,

    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_flags: Option<GetFlags>,

    #[prost(message, optional, tag = "5")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_frameworks: Option<GetFrameworks>,

    #[prost(message, optional, tag = "6")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_executors: Option<GetExecutors>,

    #[prost(message, optional, tag = "7")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_tasks: Option<GetTasks>,

    #[prost(message, optional, tag = "8")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_containers: Option<GetContainers>,

    #[prost(message, optional, tag = "9")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_nested_container: Option<WaitNestedContainerResponse>,
}

// --- Executor-facing endpoint envelopes ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ExecutorCallType {
    Unknown = 0,
    Subscribe = 1,
    Update = 2,
    Message = 3,
}

impl ExecutorCallType {
    pub fn wire_name(self) -> &'static str {
        match self {
            ExecutorCallType::Unknown => "UNKNOWN",
            ExecutorCallType::Subscribe => "SUBSCRIBE",
            ExecutorCallType::Update => "UPDATE",
            ExecutorCallType::Message => "MESSAGE",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(ExecutorCallType::Unknown),
            "SUBSCRIBE" => Some(ExecutorCallType::Subscribe),
            "UPDATE" => Some(ExecutorCallType::Update),
            "MESSAGE" => Some(ExecutorCallType::Message),
            _ => None,
        }
    }
}

wire_enum_serde!(executor_call_type_wire, super::ExecutorCallType);

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSubscribe {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_info: Option<FrameworkInfo>,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_info: Option<ExecutorInfo>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,

    #[prost(string, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorUpdate {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorMessage {
    #[prost(bytes = "vec", tag = "1")]
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Envelope for calls on the executor-facing endpoint.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorCall {
    #[prost(enumeration = "ExecutorCallType", tag = "1")]
    #[serde(rename = "type", with = "executor_call_type_wire")]
    pub r#type: i32,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<ExecutorSubscribe>,

    #[prost(message, optional, tag = "5")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<ExecutorUpdate>,

    #[prost(message, optional, tag = "6")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ExecutorMessage>,
}

impl ExecutorCall {
    pub fn call_type(&self) -> ExecutorCallType {
        ExecutorCallType::try_from(self.r#type).unwrap_or(ExecutorCallType::Unknown)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ExecutorEventType {
    Unknown = 0,
    Subscribed = 1,
}

impl ExecutorEventType {
    pub fn wire_name(self) -> &'static str {
        match self {
            ExecutorEventType::Unknown => "UNKNOWN",
            ExecutorEventType::Subscribed => "SUBSCRIBED",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(ExecutorEventType::Unknown),
            "SUBSCRIBED" => Some(ExecutorEventType::Subscribed),
            _ => None,
        }
    }
}

wire_enum_serde!(executor_event_type_wire, super::ExecutorEventType);

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSubscribed {
    #[prost(string, tag = "1")]
    pub agent_version: String,
}

/// Event streamed back to a subscribed executor.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorEvent {
    #[prost(enumeration = "ExecutorEventType", tag = "1")]
    #[serde(rename = "type", with = "executor_event_type_wire")]
    pub r#type: i32,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<ExecutorSubscribed>,
}

// --- Encoding helpers ---

/// Serialize a message in the record schema of `content_type`.
pub fn serialize_message<T>(content_type: ContentType, message: &T) -> Result<Bytes, String>
where
    T: prost::Message + Serialize,
{
    match content_type.record_type() {
        ContentType::Json => serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| format!("failed to serialize JSON message: {e}")),
        ContentType::Protobuf => {
            let mut buffer = Vec::with_capacity(message.encoded_len());
            message
                .encode(&mut buffer)
                .map_err(|e| format!("failed to serialize protobuf message: {e}"))?;
            Ok(Bytes::from(buffer))
        }
        ContentType::StreamingJson | ContentType::StreamingProtobuf => {
            unreachable!("record_type() never returns a streaming variant")
        }
    }
}

/// Deserialize a message in the record schema of `content_type`.
pub fn deserialize_message<T>(content_type: ContentType, bytes: &[u8]) -> Result<T, String>
where
    T: prost::Message + Default + DeserializeOwned,
{
    match content_type.record_type() {
        ContentType::Json => serde_json::from_slice(bytes)
            .map_err(|e| format!("failed to deserialize JSON message: {e}")),
        ContentType::Protobuf => T::decode(bytes)
            .map_err(|e| format!("failed to deserialize protobuf message: {e}")),
        ContentType::StreamingJson | ContentType::StreamingProtobuf => {
            unreachable!("record_type() never returns a streaming variant")
        }
    }
}
