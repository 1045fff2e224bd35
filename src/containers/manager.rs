//! Nested container lifecycle operations.
//!
//! # Responsibilities
//! - launch / wait / kill nested containers against the containerizer
//! - launch-with-session: launch a DEBUG container and stream its output,
//!   binding the container's lifetime to the client connection
//! - attach to a running container's input or output channel
//!
//! Every operation resolves its executor through the state registry,
//! consults the authorization gate once, and only then talks to the
//! containerizer.

use std::sync::Arc;

use crate::api::call::{CallOutcome, LaunchNestedContainer, Response};
use crate::api::content_type::ContentType;
use crate::api::error::ApiError;
use crate::api::types::{CommandInfo, ContainerId, ProcessIo};
use crate::api::v1;
use crate::auth::{resolve_approver, Action, AuthObject, Authorizer, ObjectApprover};
use crate::containerizer::{
    ContainerClass, Containerizer, IoConnection, IoRequest, IoRequestBody,
};
use crate::io::pipe::{pipe, Reader};
use crate::io::recordio::{encode_frame, RecordReader};
use crate::io::relay::pump;
use crate::state::{Registry, RegistryError, ResolvedExecutor};

use super::session::{bind_session, SessionDestroyer, SessionTracker};

pub struct NestedContainerManager {
    registry: Registry,
    containerizer: Arc<dyn Containerizer>,
    authorizer: Option<Arc<dyn Authorizer>>,
    sessions: SessionTracker,
}

fn internal(error: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(error.to_string())
}

fn registry_error(error: RegistryError) -> ApiError {
    internal(error)
}

/// The executor's user, unless the command overrides it.
#[cfg(unix)]
fn effective_user(resolved: &ResolvedExecutor, command: &CommandInfo) -> Option<String> {
    command.user.clone().or_else(|| resolved.user.clone())
}

/// Command user overrides are not honored on this platform.
#[cfg(not(unix))]
fn effective_user(resolved: &ResolvedExecutor, _command: &CommandInfo) -> Option<String> {
    resolved.user.clone()
}

/// Per-record check for everything after the first attach-input record.
fn validate_input_record(record: &v1::Call) -> Result<(), String> {
    if record.call_type() != v1::CallType::AttachContainerInput {
        return Err(format!(
            "expecting ATTACH_CONTAINER_INPUT records, got {}",
            record.call_type().wire_name()
        ));
    }
    let payload = record
        .attach_container_input
        .as_ref()
        .ok_or("expecting 'attach_container_input' to be present")?;
    let kind = v1::AttachInputKind::try_from(payload.kind)
        .unwrap_or(v1::AttachInputKind::Unknown);
    if kind != v1::AttachInputKind::ProcessIo {
        return Err(
            "expecting 'attach_container_input.type' to be PROCESS_IO after the first record"
                .to_string(),
        );
    }
    if payload.process_io.is_none() {
        return Err("expecting 'attach_container_input.process_io' to be present".to_string());
    }
    Ok(())
}

/// Keep the switchboard connection's disconnect notification observed until
/// it actually fires, rather than dropping it on the floor.
fn observe_disconnect(connection: &IoConnection, container_id: &ContainerId, channel: &'static str) {
    let disconnected = connection.disconnected();
    let container_id = container_id.clone();
    tokio::spawn(async move {
        disconnected.wait().await;
        tracing::debug!(container_id = %container_id, channel, "Switchboard connection closed");
    });
}

impl NestedContainerManager {
    pub fn new(
        registry: Registry,
        containerizer: Arc<dyn Containerizer>,
        authorizer: Option<Arc<dyn Authorizer>>,
    ) -> Self {
        Self {
            registry,
            containerizer,
            authorizer,
            sessions: SessionTracker::new(),
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    async fn approver(
        &self,
        principal: Option<&str>,
        action: Action,
    ) -> Result<Box<dyn ObjectApprover>, ApiError> {
        resolve_approver(self.authorizer.as_ref(), principal, action)
            .await
            .map_err(internal)
    }

    fn approve(approver: &dyn ObjectApprover, object: &AuthObject) -> Result<(), ApiError> {
        match approver.approved(object) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApiError::Forbidden),
            Err(error) => Err(internal(error)),
        }
    }

    /// Resolve the executor addressed exactly or through its parent, for
    /// wait/kill style calls.
    async fn resolve_for(
        &self,
        container_id: &ContainerId,
        approver: &dyn ObjectApprover,
    ) -> Result<ResolvedExecutor, ApiError> {
        let resolved = self
            .registry
            .resolve_container(container_id)
            .await
            .map_err(registry_error)?
            .ok_or_else(|| {
                ApiError::NotFound(format!("Container {container_id} cannot be found"))
            })?;

        let object = AuthObject {
            executor: Some(resolved.executor.clone()),
            framework: Some(resolved.framework.clone()),
            command: None,
        };
        Self::approve(approver, &object)?;
        Ok(resolved)
    }

    pub async fn launch(
        &self,
        principal: Option<&str>,
        args: LaunchNestedContainer,
    ) -> Result<CallOutcome, ApiError> {
        let approver = self
            .approver(principal, Action::LaunchNestedContainer)
            .await?;
        self.launch_inner(&args, ContainerClass::Default, approver.as_ref())
            .await?;
        Ok(CallOutcome::Empty)
    }

    /// Shared launch path for LAUNCH_NESTED_CONTAINER and sessions.
    async fn launch_inner(
        &self,
        args: &LaunchNestedContainer,
        class: ContainerClass,
        approver: &dyn ObjectApprover,
    ) -> Result<(), ApiError> {
        let container_id = &args.container_id;

        // One level of nesting beneath the executor's container, no more.
        // Deeper chains are rejected, not truncated.
        if let Some(parent) = &container_id.parent {
            if parent.parent.is_some() {
                return Err(ApiError::NotImplemented(
                    "Only a single level of container nesting is supported currently, but \
                     'container_id.parent.parent' is set"
                        .into(),
                ));
            }
        }

        // Bad Request rather than Not Found: the parent id is caller
        // supplied, and it must be set to the executor's own container id.
        let Some(parent) = container_id.parent.as_deref() else {
            return Err(ApiError::BadRequest(
                "Expecting 'container_id.parent' to be set to the executor's container id"
                    .into(),
            ));
        };

        let resolved = self
            .registry
            .resolve_parent(parent)
            .await
            .map_err(registry_error)?
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Unable to locate executor for parent container {parent}"
                ))
            })?;

        let object = AuthObject {
            executor: Some(resolved.executor.clone()),
            framework: Some(resolved.framework.clone()),
            command: Some(args.command.clone()),
        };
        Self::approve(approver, &object)?;

        let user = effective_user(&resolved, &args.command);

        match self
            .containerizer
            .launch(
                container_id,
                &args.command,
                args.container.as_ref(),
                user.as_deref(),
                class,
            )
            .await
        {
            Ok(true) => Ok(()),
            // Nothing was created; no cleanup to do.
            Ok(false) => Err(ApiError::BadRequest(
                "The provided ContainerInfo is not supported".into(),
            )),
            Err(error) => {
                tracing::warn!(
                    container_id = %container_id,
                    error = %error,
                    "Failed to launch nested container"
                );

                // The containerizer requires the caller to destroy after a
                // failed launch. Its own failure is logged, never returned;
                // the caller sees the original launch failure.
                if let Err(destroy_error) = self.containerizer.destroy(container_id).await {
                    tracing::error!(
                        container_id = %container_id,
                        error = %destroy_error,
                        "Failed to destroy nested container after launch failure"
                    );
                }

                Err(internal(error))
            }
        }
    }

    pub async fn wait(
        &self,
        principal: Option<&str>,
        container_id: &ContainerId,
    ) -> Result<CallOutcome, ApiError> {
        let approver = self.approver(principal, Action::WaitNestedContainer).await?;
        self.resolve_for(container_id, approver.as_ref()).await?;

        let termination = self
            .containerizer
            .wait(container_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| {
                ApiError::NotFound(format!("Container {container_id} cannot be found"))
            })?;

        Ok(CallOutcome::Message(Response::WaitNestedContainer {
            exit_status: termination.exit_status,
        }))
    }

    pub async fn kill(
        &self,
        principal: Option<&str>,
        container_id: &ContainerId,
    ) -> Result<CallOutcome, ApiError> {
        let approver = self.approver(principal, Action::KillNestedContainer).await?;
        self.resolve_for(container_id, approver.as_ref()).await?;

        let found = self
            .containerizer
            .destroy(container_id)
            .await
            .map_err(internal)?;

        if !found {
            return Err(ApiError::NotFound(format!(
                "Container '{container_id}' cannot be found (or is already killed)"
            )));
        }

        Ok(CallOutcome::Empty)
    }

    /// Relay an attach-input frame stream into the container's input
    /// channel. The first record was consumed by the dispatcher to learn
    /// the call type; it is re-encoded and written ahead of the rest.
    pub async fn attach_input(
        &self,
        container_id: ContainerId,
        first_record: v1::Call,
        records: RecordReader<v1::Call>,
        content_type: ContentType,
        accept: ContentType,
    ) -> Result<CallOutcome, ApiError> {
        let record_type = content_type.record_type();
        let (mut writer, reader) = pipe();

        let first = v1::serialize_message(record_type, &first_record).map_err(internal)?;
        if writer.write(encode_frame(&first)).await.is_err() {
            return Err(internal("input pipe closed before the first record"));
        }

        let guard = self.sessions.track();
        tokio::spawn(async move {
            let _guard = guard;
            let _ = pump(
                records,
                move |record: v1::Call| {
                    validate_input_record(&record)?;
                    v1::serialize_message(record_type, &record)
                        .map(|bytes| encode_frame(&bytes))
                },
                writer,
            )
            .await;
        });

        let connection = self
            .containerizer
            .attach(&container_id)
            .await
            .map_err(internal)?;
        observe_disconnect(&connection, &container_id, "input");

        let response = connection
            .send(IoRequest {
                content_type,
                accept,
                body: IoRequestBody::Streaming(reader),
            })
            .await
            .map_err(internal)?;

        if !response.ok {
            return Err(ApiError::Internal(format!(
                "Failed to attach to the input of container {container_id}"
            )));
        }

        Ok(CallOutcome::Empty)
    }

    pub async fn attach_output(
        &self,
        container_id: &ContainerId,
        content_type: ContentType,
        accept: ContentType,
    ) -> Result<CallOutcome, ApiError> {
        let reader = self
            .attach_output_stream(container_id, content_type, accept)
            .await?;
        Ok(CallOutcome::Stream {
            content_type: accept,
            reader,
        })
    }

    /// Open the container's output channel and return a pipe of re-framed
    /// records, converted from the internal schema to the external one
    /// without buffering the whole stream.
    async fn attach_output_stream(
        &self,
        container_id: &ContainerId,
        content_type: ContentType,
        accept: ContentType,
    ) -> Result<Reader, ApiError> {
        let connection = self
            .containerizer
            .attach(container_id)
            .await
            .map_err(internal)?;
        observe_disconnect(&connection, container_id, "output");

        let call = v1::Call {
            r#type: v1::CallType::AttachContainerOutput as i32,
            attach_container_output: Some(v1::AttachContainerOutput {
                container_id: Some(container_id.clone()),
            }),
            ..Default::default()
        };
        let body = v1::serialize_message(content_type, &call).map_err(internal)?;

        let response = connection
            .send(IoRequest {
                content_type,
                accept,
                body: IoRequestBody::Full(body),
            })
            .await
            .map_err(internal)?;

        if !response.ok {
            return Err(ApiError::Internal(format!(
                "Failed to attach to the output of container {container_id}"
            )));
        }

        let record_type = accept.record_type();
        let records = RecordReader::<ProcessIo>::new(response.body, move |bytes| {
            v1::deserialize_message(record_type, bytes)
        });

        let (writer, reader) = pipe();
        let id = container_id.clone();
        tokio::spawn(async move {
            if let Err(error) = pump(
                records,
                move |io: ProcessIo| {
                    v1::serialize_message(record_type, &io).map(|bytes| encode_frame(&bytes))
                },
                writer,
            )
            .await
            {
                tracing::warn!(
                    container_id = %id,
                    error = %error,
                    "Attach output relay failed"
                );
            }
        });

        Ok(reader)
    }

    /// Launch a DEBUG container and stream its output back, destroying the
    /// container exactly once on the first of: launch failure (inside
    /// `launch_inner`), attach failure, output EOF, or client disconnect.
    pub async fn launch_session(
        &self,
        principal: Option<&str>,
        args: LaunchNestedContainer,
        content_type: ContentType,
        accept: ContentType,
    ) -> Result<CallOutcome, ApiError> {
        let container_id = args.container_id.clone();
        let approver = self
            .approver(principal, Action::LaunchNestedContainerSession)
            .await?;

        self.launch_inner(&args, ContainerClass::Debug, approver.as_ref())
            .await?;

        let destroyer = SessionDestroyer::new(self.containerizer.clone(), container_id.clone());

        let output = match self
            .attach_output_stream(&container_id, content_type, accept)
            .await
        {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(
                    container_id = %container_id,
                    error = %error,
                    "Failed to attach to nested container session"
                );
                destroyer.destroy("attach failure");
                return Err(error);
            }
        };

        let reader = bind_session(output, destroyer, self.sessions.track());
        Ok(CallOutcome::Stream {
            content_type: accept,
            reader,
        })
    }
}
