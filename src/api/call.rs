//! Internal call and response model.
//!
//! # Responsibilities
//! - Define the closed sum types the dispatcher matches exhaustively
//! - Devolve external `v1` envelopes into the internal model, enforcing
//!   payload presence per call type
//! - Evolve internal responses back into `v1` envelopes for serialization
//!
//! Adding a call type extends the enum and every `match` over it fails to
//! compile until handled; there is no catch-all arm anywhere in dispatch.

use thiserror::Error;

use super::content_type::ContentType;
use super::types::{CommandInfo, ContainerId, ContainerInfo, ContainerSummary, ExecutorInfo,
    Flag, FrameworkInfo, Task, VersionInfo};
use super::v1;
use crate::io::pipe::Reader;

/// Rejection of a structurally invalid call.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("failed to validate call: {0}")]
pub struct ValidationError(pub String);

/// Arguments for launching a nested container, with presence resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchNestedContainer {
    pub container_id: ContainerId,
    pub command: CommandInfo,
    pub container: Option<ContainerInfo>,
}

/// First record of an attach-input stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachContainerInput {
    pub container_id: ContainerId,
}

/// An API call in the internal schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Unknown,
    GetHealth,
    GetVersion,
    GetFlags,
    GetFrameworks,
    GetExecutors,
    GetTasks,
    GetContainers,
    LaunchNestedContainer(LaunchNestedContainer),
    LaunchNestedContainerSession(LaunchNestedContainer),
    WaitNestedContainer { container_id: ContainerId },
    KillNestedContainer { container_id: ContainerId },
    AttachContainerInput(AttachContainerInput),
    AttachContainerOutput { container_id: ContainerId },
}

impl Call {
    /// The wire name of this call's type, for logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Call::Unknown => "UNKNOWN",
            Call::GetHealth => "GET_HEALTH",
            Call::GetVersion => "GET_VERSION",
            Call::GetFlags => "GET_FLAGS",
            Call::GetFrameworks => "GET_FRAMEWORKS",
            Call::GetExecutors => "GET_EXECUTORS",
            Call::GetTasks => "GET_TASKS",
            Call::GetContainers => "GET_CONTAINERS",
            Call::LaunchNestedContainer(_) => "LAUNCH_NESTED_CONTAINER",
            Call::LaunchNestedContainerSession(_) => "LAUNCH_NESTED_CONTAINER_SESSION",
            Call::WaitNestedContainer { .. } => "WAIT_NESTED_CONTAINER",
            Call::KillNestedContainer { .. } => "KILL_NESTED_CONTAINER",
            Call::AttachContainerInput(_) => "ATTACH_CONTAINER_INPUT",
            Call::AttachContainerOutput { .. } => "ATTACH_CONTAINER_OUTPUT",
        }
    }

}

fn required<T>(field: Option<T>, name: &str) -> Result<T, ValidationError> {
    field.ok_or_else(|| ValidationError(format!("expecting '{name}' to be present")))
}

fn valid_container_id(id: ContainerId, name: &str) -> Result<ContainerId, ValidationError> {
    if id.value.is_empty() {
        return Err(ValidationError(format!("'{name}.value' must be non-empty")));
    }
    Ok(id)
}

fn launch_args(
    payload: Option<v1::LaunchNestedContainer>,
    name: &str,
) -> Result<LaunchNestedContainer, ValidationError> {
    let payload = required(payload, name)?;
    let container_id = valid_container_id(
        required(payload.container_id, &format!("{name}.container_id"))?,
        &format!("{name}.container_id"),
    )?;
    let command = required(payload.command, &format!("{name}.command"))?;
    Ok(LaunchNestedContainer {
        container_id,
        command,
        container: payload.container,
    })
}

/// Convert an external call into the internal schema, enforcing the payload
/// presence rules for its call type.
pub fn devolve(call: v1::Call) -> Result<Call, ValidationError> {
    match call.call_type() {
        v1::CallType::Unknown => Ok(Call::Unknown),
        v1::CallType::GetHealth => Ok(Call::GetHealth),
        v1::CallType::GetVersion => Ok(Call::GetVersion),
        v1::CallType::GetFlags => Ok(Call::GetFlags),
        v1::CallType::GetFrameworks => Ok(Call::GetFrameworks),
        v1::CallType::GetExecutors => Ok(Call::GetExecutors),
        v1::CallType::GetTasks => Ok(Call::GetTasks),
        v1::CallType::GetContainers => Ok(Call::GetContainers),
        v1::CallType::LaunchNestedContainer => Ok(Call::LaunchNestedContainer(launch_args(
            call.launch_nested_container,
            "launch_nested_container",
        )?)),
        v1::CallType::LaunchNestedContainerSession => {
            Ok(Call::LaunchNestedContainerSession(launch_args(
                call.launch_nested_container_session,
                "launch_nested_container_session",
            )?))
        }
        v1::CallType::WaitNestedContainer => {
            let payload = required(call.wait_nested_container, "wait_nested_container")?;
            Ok(Call::WaitNestedContainer {
                container_id: valid_container_id(
                    required(payload.container_id, "wait_nested_container.container_id")?,
                    "wait_nested_container.container_id",
                )?,
            })
        }
        v1::CallType::KillNestedContainer => {
            let payload = required(call.kill_nested_container, "kill_nested_container")?;
            Ok(Call::KillNestedContainer {
                container_id: valid_container_id(
                    required(payload.container_id, "kill_nested_container.container_id")?,
                    "kill_nested_container.container_id",
                )?,
            })
        }
        v1::CallType::AttachContainerInput => {
            let payload = required(call.attach_container_input, "attach_container_input")?;
            let kind = v1::AttachInputKind::try_from(payload.kind)
                .unwrap_or(v1::AttachInputKind::Unknown);
            if kind != v1::AttachInputKind::ContainerId {
                return Err(ValidationError(
                    "expecting 'attach_container_input.type' to be CONTAINER_ID for the \
                     first record"
                        .into(),
                ));
            }
            Ok(Call::AttachContainerInput(AttachContainerInput {
                container_id: valid_container_id(
                    required(payload.container_id, "attach_container_input.container_id")?,
                    "attach_container_input.container_id",
                )?,
            }))
        }
        v1::CallType::AttachContainerOutput => {
            let payload = required(call.attach_container_output, "attach_container_output")?;
            Ok(Call::AttachContainerOutput {
                container_id: valid_container_id(
                    required(payload.container_id, "attach_container_output.container_id")?,
                    "attach_container_output.container_id",
                )?,
            })
        }
    }
}

/// An API response in the internal schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    GetHealth { healthy: bool },
    GetVersion { version: VersionInfo },
    GetFlags { flags: Vec<Flag> },
    GetFrameworks { frameworks: Vec<FrameworkInfo> },
    GetExecutors { executors: Vec<ExecutorInfo> },
    GetTasks { tasks: Vec<Task> },
    GetContainers { containers: Vec<ContainerSummary> },
    WaitNestedContainer { exit_status: Option<i32> },
}

/// Convert an internal response into the external envelope.
pub fn evolve(response: Response) -> v1::Response {
    match response {
        Response::GetHealth { healthy } => v1::Response {
            r#type: v1::ResponseType::GetHealth as i32,
            get_health: Some(v1::GetHealth { healthy }),
            ..Default::default()
        },
        Response::GetVersion { version } => v1::Response {
            r#type: v1::ResponseType::GetVersion as i32,
            get_version: Some(v1::GetVersion {
                version_info: Some(version),
            }),
            ..Default::default()
        },
        Response::GetFlags { flags } => v1::Response {
            r#type: v1::ResponseType::GetFlags as i32,
            get_flags: Some(v1::GetFlags { flags }),
            ..Default::default()
        },
        Response::GetFrameworks { frameworks } => v1::Response {
            r#type: v1::ResponseType::GetFrameworks as i32,
            get_frameworks: Some(v1::GetFrameworks { frameworks }),
            ..Default::default()
        },
        Response::GetExecutors { executors } => v1::Response {
            r#type: v1::ResponseType::GetExecutors as i32,
            get_executors: Some(v1::GetExecutors { executors }),
            ..Default::default()
        },
        Response::GetTasks { tasks } => v1::Response {
            r#type: v1::ResponseType::GetTasks as i32,
            get_tasks: Some(v1::GetTasks { tasks }),
            ..Default::default()
        },
        Response::GetContainers { containers } => v1::Response {
            r#type: v1::ResponseType::GetContainers as i32,
            get_containers: Some(v1::GetContainers { containers }),
            ..Default::default()
        },
        Response::WaitNestedContainer { exit_status } => v1::Response {
            r#type: v1::ResponseType::WaitNestedContainer as i32,
            wait_nested_container: Some(v1::WaitNestedContainerResponse { exit_status }),
            ..Default::default()
        },
    }
}

/// Terminal outcome of a dispatched call, before response encoding.
pub enum CallOutcome {
    /// 200 with an empty body.
    Empty,
    /// 202 with an empty body (fire-and-forget executor calls).
    Accepted,
    /// 200 with one serialized message.
    Message(Response),
    /// 200 with a streamed body read from the pipe.
    Stream {
        content_type: ContentType,
        reader: Reader,
    },
}
