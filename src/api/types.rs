//! Wire message types shared by the v1 schema and the internal call model.
//!
//! Every message carries both `serde` derives (JSON bodies) and hand-written
//! `prost` attributes (protobuf bodies), so one definition serves both
//! encodings of the API.

use serde::{Deserialize, Serialize};

/// Base64 representation for binary payload fields in JSON bodies.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// JSON names for enum fields stored as `i32` on the protobuf side.
///
/// Generates a `#[serde(with = ...)]` module mapping the wire name of the
/// enum (via its `wire_name`/`from_wire_name` impl) to the raw value.
macro_rules! wire_enum_serde {
    ($module:ident, $enum:ty) => {
        pub(crate) mod $module {
            use serde::{Deserialize, Deserializer, Serializer};

            pub fn serialize<S: Serializer>(
                value: &i32,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                let parsed = <$enum>::try_from(*value)
                    .map_err(|_| serde::ser::Error::custom("enum value out of range"))?;
                serializer.serialize_str(parsed.wire_name())
            }

            pub fn deserialize<'de, D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<i32, D::Error> {
                let name = String::deserialize(deserializer)?;
                <$enum>::from_wire_name(&name)
                    .map(|parsed| parsed as i32)
                    .ok_or_else(|| {
                        serde::de::Error::custom(format!("unknown enum variant {name:?}"))
                    })
            }
        }
    };
}

pub(crate) use wire_enum_serde;

/// Identifier of a container, optionally chained beneath a parent.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerId {
    #[prost(string, tag = "1")]
    pub value: String,

    #[prost(message, optional, boxed, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<ContainerId>>,
}

impl ContainerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: ContainerId) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}.{}", parent, self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentVariable {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, tag = "2")]
    pub value: String,
}

/// Command to run inside a nested container.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandInfo {
    #[prost(bool, tag = "1")]
    pub shell: bool,

    #[prost(string, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[prost(string, repeated, tag = "3")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,

    #[prost(string, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[prost(message, repeated, tag = "5")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvironmentVariable>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ContainerKind {
    Unknown = 0,
    Native = 1,
    Docker = 2,
}

impl ContainerKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            ContainerKind::Unknown => "UNKNOWN",
            ContainerKind::Native => "NATIVE",
            ContainerKind::Docker => "DOCKER",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(ContainerKind::Unknown),
            "NATIVE" => Some(ContainerKind::Native),
            "DOCKER" => Some(ContainerKind::Docker),
            _ => None,
        }
    }
}

wire_enum_serde!(container_kind_wire, super::ContainerKind);

/// Container runtime options supplied by the caller. Whether a particular
/// combination is supported is the containerizer's decision, not ours.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerInfo {
    #[prost(enumeration = "ContainerKind", tag = "1")]
    #[serde(rename = "type", with = "container_kind_wire")]
    pub kind: i32,

    #[prost(string, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorInfo {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,

    #[prost(string, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkInfo {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,

    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(string, tag = "3")]
    pub user: String,

    #[prost(string, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum TaskState {
    TaskUnknown = 0,
    TaskStaging = 1,
    TaskStarting = 2,
    TaskRunning = 3,
    TaskFinished = 4,
    TaskFailed = 5,
    TaskKilled = 6,
}

impl TaskState {
    pub fn wire_name(self) -> &'static str {
        match self {
            TaskState::TaskUnknown => "TASK_UNKNOWN",
            TaskState::TaskStaging => "TASK_STAGING",
            TaskState::TaskStarting => "TASK_STARTING",
            TaskState::TaskRunning => "TASK_RUNNING",
            TaskState::TaskFinished => "TASK_FINISHED",
            TaskState::TaskFailed => "TASK_FAILED",
            TaskState::TaskKilled => "TASK_KILLED",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "TASK_UNKNOWN" => Some(TaskState::TaskUnknown),
            "TASK_STAGING" => Some(TaskState::TaskStaging),
            "TASK_STARTING" => Some(TaskState::TaskStarting),
            "TASK_RUNNING" => Some(TaskState::TaskRunning),
            "TASK_FINISHED" => Some(TaskState::TaskFinished),
            "TASK_FAILED" => Some(TaskState::TaskFailed),
            "TASK_KILLED" => Some(TaskState::TaskKilled),
            _ => None,
        }
    }
}

wire_enum_serde!(task_state_wire, super::TaskState);

/// Task status update reported by an executor.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStatus {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    #[prost(enumeration = "TaskState", tag = "2")]
    #[serde(with = "task_state_wire")]
    pub state: i32,

    #[prost(string, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Task projection returned by GET_TASKS.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(enumeration = "TaskState", tag = "3")]
    #[serde(with = "task_state_wire")]
    pub state: i32,

    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    #[prost(message, optional, tag = "5")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,
}

/// Container projection returned by GET_CONTAINERS.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSummary {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    #[prost(string, tag = "1")]
    pub version: String,
}

/// One agent configuration flag, flattened to `name`/`value` strings.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Flag {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProcessIoKind {
    Unknown = 0,
    Data = 1,
    Control = 2,
}

impl ProcessIoKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            ProcessIoKind::Unknown => "UNKNOWN",
            ProcessIoKind::Data => "DATA",
            ProcessIoKind::Control => "CONTROL",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(ProcessIoKind::Unknown),
            "DATA" => Some(ProcessIoKind::Data),
            "CONTROL" => Some(ProcessIoKind::Control),
            _ => None,
        }
    }
}

wire_enum_serde!(process_io_kind_wire, super::ProcessIoKind);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProcessIoDataKind {
    Unknown = 0,
    Stdin = 1,
    Stdout = 2,
    Stderr = 3,
}

impl ProcessIoDataKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            ProcessIoDataKind::Unknown => "UNKNOWN",
            ProcessIoDataKind::Stdin => "STDIN",
            ProcessIoDataKind::Stdout => "STDOUT",
            ProcessIoDataKind::Stderr => "STDERR",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(ProcessIoDataKind::Unknown),
            "STDIN" => Some(ProcessIoDataKind::Stdin),
            "STDOUT" => Some(ProcessIoDataKind::Stdout),
            "STDERR" => Some(ProcessIoDataKind::Stderr),
            _ => None,
        }
    }
}

wire_enum_serde!(process_io_data_kind_wire, super::ProcessIoDataKind);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProcessIoControlKind {
    Unknown = 0,
    Heartbeat = 1,
}

impl ProcessIoControlKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            ProcessIoControlKind::Unknown => "UNKNOWN",
            ProcessIoControlKind::Heartbeat => "HEARTBEAT",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(ProcessIoControlKind::Unknown),
            "HEARTBEAT" => Some(ProcessIoControlKind::Heartbeat),
            _ => None,
        }
    }
}

wire_enum_serde!(process_io_control_kind_wire, super::ProcessIoControlKind);

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessIoData {
    #[prost(enumeration = "ProcessIoDataKind", tag = "1")]
    #[serde(rename = "type", with = "process_io_data_kind_wire")]
    pub kind: i32,

    #[prost(bytes = "vec", tag = "2")]
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessIoControl {
    #[prost(enumeration = "ProcessIoControlKind", tag = "1")]
    #[serde(rename = "type", with = "process_io_control_kind_wire")]
    pub kind: i32,
}

/// One record of standard-I/O traffic relayed between a client and a
/// container's switchboard.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessIo {
    #[prost(enumeration = "ProcessIoKind", tag = "1")]
    #[serde(rename = "type", with = "process_io_kind_wire")]
    pub kind: i32,

    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProcessIoData>,

    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<ProcessIoControl>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_display_includes_parent_chain() {
        let id = ContainerId::new("nested").with_parent(ContainerId::new("exec"));
        assert_eq!(id.to_string(), "exec.nested");
    }

    #[test]
    fn process_io_data_round_trips_through_json_base64() {
        let io = ProcessIo {
            kind: ProcessIoKind::Data as i32,
            data: Some(ProcessIoData {
                kind: ProcessIoDataKind::Stdout as i32,
                data: b"hello\x00world".to_vec(),
            }),
            control: None,
        };

        let json = serde_json::to_string(&io).unwrap();
        assert!(json.contains("\"STDOUT\""));
        let back: ProcessIo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, io);
    }

    #[test]
    fn unknown_enum_names_are_rejected() {
        let result: Result<ProcessIo, _> =
            serde_json::from_str(r#"{"type":"BOGUS"}"#);
        assert!(result.is_err());
    }
}
