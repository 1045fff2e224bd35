//! Call dispatch for the operator API endpoint.
//!
//! # Responsibilities
//! - Enforce the request shape: POST, a known Content-Type, an acceptable
//!   response encoding
//! - Decode the call: a whole-body message, or exactly the first frame of a
//!   streaming body
//! - Route by call type with an exhaustive match, and encode the outcome

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use futures_util::StreamExt;

use crate::auth::{resolve_approver, Action, AuthObject, ObjectApprover};
use crate::io::pipe::{pipe, Reader};
use crate::io::recordio::{encode_frame, RecordReader};
use crate::observability::metrics;

use super::call::{devolve, Call, CallOutcome, Response};
use super::content_type::{
    negotiate_accept, ContentType, APPLICATION_JSON, APPLICATION_PROTOBUF,
    APPLICATION_RECORDIO_JSON, APPLICATION_RECORDIO_PROTOBUF,
};
use super::error::ApiError;
use super::server::AppState;
use super::types::{Flag, VersionInfo};
use super::v1;

/// Header carrying the authenticated principal, when one is present.
pub const PRINCIPAL_HEADER: &str = "x-agent-principal";

/// Entry point for `POST /api/v1`.
pub async fn handle_api(
    State(state): State<AppState>,
    request: Request<Body>,
) -> axum::response::Response {
    let start = Instant::now();
    let mut call_name = "UNKNOWN";

    let response = match api(state, request, &mut call_name).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    };

    metrics::record_call(call_name, response.status().as_u16(), start);
    response
}

pub(super) fn extract_content_type(headers: &HeaderMap) -> Result<ContentType, ApiError> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .ok_or_else(|| ApiError::BadRequest("Expecting 'Content-Type' to be present".into()))?;

    value
        .to_str()
        .ok()
        .and_then(ContentType::from_media_type)
        .ok_or_else(|| {
            ApiError::UnsupportedMediaType(format!(
                "Expecting 'Content-Type' of {APPLICATION_JSON} or {APPLICATION_PROTOBUF} or \
                 {APPLICATION_RECORDIO_JSON} or {APPLICATION_RECORDIO_PROTOBUF}"
            ))
        })
}

pub(super) fn negotiate(headers: &HeaderMap) -> Result<ContentType, ApiError> {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    negotiate_accept(accept).ok_or_else(|| {
        ApiError::NotAcceptable(format!(
            "Expecting 'Accept' to allow {APPLICATION_JSON} or {APPLICATION_PROTOBUF} or \
             {APPLICATION_RECORDIO_JSON} or {APPLICATION_RECORDIO_PROTOBUF}"
        ))
    })
}

pub(super) fn principal(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Forward an HTTP request body onto a pipe so the record reader can pull
/// chunks one at a time.
pub(super) fn body_reader(body: Body) -> Reader {
    let (mut writer, reader) = pipe();
    let mut data = body.into_data_stream();

    tokio::spawn(async move {
        loop {
            match data.next().await {
                Some(Ok(chunk)) => {
                    if writer.write(chunk).await.is_err() {
                        return;
                    }
                }
                Some(Err(error)) => {
                    writer.fail(format!("request body failed: {error}"));
                    return;
                }
                None => {
                    writer.close();
                    return;
                }
            }
        }
    });

    reader
}

/// Encode a call outcome into the negotiated response encoding. A single
/// message under a streaming accept type goes out as one frame.
pub(super) fn encode_outcome(
    outcome: CallOutcome,
    accept: ContentType,
) -> Result<axum::response::Response, ApiError> {
    match outcome {
        CallOutcome::Empty => Ok(StatusCode::OK.into_response()),
        CallOutcome::Accepted => Ok(StatusCode::ACCEPTED.into_response()),
        CallOutcome::Message(response) => {
            let wire = super::call::evolve(response);
            let bytes = v1::serialize_message(accept, &wire).map_err(ApiError::Internal)?;
            let body = if accept.is_streaming() {
                encode_frame(&bytes)
            } else {
                bytes
            };
            Ok((
                [(header::CONTENT_TYPE, accept.as_media_type())],
                body,
            )
                .into_response())
        }
        CallOutcome::Stream {
            content_type,
            reader,
        } => Ok((
            [(header::CONTENT_TYPE, content_type.as_media_type())],
            Body::from_stream(reader.into_stream()),
        )
            .into_response()),
    }
}

async fn api(
    state: AppState,
    request: Request<Body>,
    call_name: &mut &'static str,
) -> Result<axum::response::Response, ApiError> {
    if !state.registry.recovered() {
        return Err(ApiError::ServiceUnavailable(
            "Agent has not finished recovery".into(),
        ));
    }

    let (parts, body) = request.into_parts();
    let content_type = extract_content_type(&parts.headers)?;
    let accept = negotiate(&parts.headers)?;
    let principal = principal(&parts.headers);

    if content_type.is_streaming() {
        let record_type = content_type.record_type();
        let mut records = RecordReader::<v1::Call>::new(body_reader(body), move |bytes| {
            v1::deserialize_message(record_type, bytes)
        });

        // Read exactly the first frame to learn the call type; the rest of
        // the decoder is handed off for attach input.
        let first = match records.read().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(ApiError::BadRequest(
                    "Received EOF while reading the first record".into(),
                ))
            }
            Err(error) => return Err(ApiError::BadRequest(error.to_string())),
        };

        let call = devolve(first.clone()).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        *call_name = call.type_name();
        tracing::info!(call = call.type_name(), "Processing call");

        match call {
            Call::AttachContainerInput(input) => {
                let outcome = state
                    .manager
                    .attach_input(input.container_id, first, records, content_type, accept)
                    .await?;
                encode_outcome(outcome, accept)
            }
            other => Err(ApiError::UnsupportedMediaType(format!(
                "Streaming 'Content-Type' {content_type} is not supported for {} call",
                other.type_name()
            ))),
        }
    } else {
        let bytes = axum::body::to_bytes(body, state.config.api.max_body_size)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {e}")))?;

        let wire_call: v1::Call =
            v1::deserialize_message(content_type, &bytes).map_err(ApiError::BadRequest)?;
        let call = devolve(wire_call).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        *call_name = call.type_name();
        tracing::info!(call = call.type_name(), "Processing call");

        dispatch(state, principal, call, content_type, accept).await
    }
}

/// Route one decoded call. Total over the call enum: adding a call type
/// fails to compile until it gets an arm here.
async fn dispatch(
    state: AppState,
    principal: Option<String>,
    call: Call,
    content_type: ContentType,
    accept: ContentType,
) -> Result<axum::response::Response, ApiError> {
    let principal = principal.as_deref();

    let outcome = match call {
        Call::Unknown => return Err(ApiError::NotImplemented("Unknown call type".into())),
        Call::GetHealth => CallOutcome::Message(Response::GetHealth { healthy: true }),
        Call::GetVersion => CallOutcome::Message(Response::GetVersion {
            version: VersionInfo {
                version: env!("CARGO_PKG_VERSION").into(),
            },
        }),
        Call::GetFlags => get_flags(&state, principal).await?,
        Call::GetFrameworks => get_frameworks(&state, principal).await?,
        Call::GetExecutors => get_executors(&state, principal).await?,
        Call::GetTasks => get_tasks(&state, principal).await?,
        Call::GetContainers => CallOutcome::Message(Response::GetContainers {
            containers: state
                .registry
                .containers()
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        }),
        Call::LaunchNestedContainer(args) => state.manager.launch(principal, args).await?,
        Call::LaunchNestedContainerSession(args) => {
            state
                .manager
                .launch_session(principal, args, content_type, accept)
                .await?
        }
        Call::WaitNestedContainer { container_id } => {
            state.manager.wait(principal, &container_id).await?
        }
        Call::KillNestedContainer { container_id } => {
            state.manager.kill(principal, &container_id).await?
        }
        // Attach input only exists as a streaming request; it is handled
        // before dispatch on that path.
        Call::AttachContainerInput(_) => {
            return Err(ApiError::UnsupportedMediaType(format!(
                "Expecting 'Content-Type' of {APPLICATION_RECORDIO_JSON} or \
                 {APPLICATION_RECORDIO_PROTOBUF} for ATTACH_CONTAINER_INPUT call"
            )))
        }
        Call::AttachContainerOutput { container_id } => {
            state
                .manager
                .attach_output(&container_id, content_type, accept)
                .await?
        }
    };

    encode_outcome(outcome, accept)
}

async fn approver_for(
    state: &AppState,
    principal: Option<&str>,
    action: Action,
) -> Result<Box<dyn ObjectApprover>, ApiError> {
    resolve_approver(state.authorizer.as_ref(), principal, action)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn get_flags(state: &AppState, principal: Option<&str>) -> Result<CallOutcome, ApiError> {
    let approver = approver_for(state, principal, Action::ViewFlags).await?;
    match approver.approved(&AuthObject::default()) {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::Forbidden),
        Err(error) => return Err(ApiError::Internal(error.to_string())),
    }

    let flags: Vec<Flag> = state.config.flags();
    Ok(CallOutcome::Message(Response::GetFlags { flags }))
}

/// Apply the approver per item: a deny filters the item out rather than
/// failing the call, an evaluation error fails the whole call.
fn filter_approved<T>(
    items: Vec<T>,
    approver: &dyn ObjectApprover,
    object: impl Fn(&T) -> AuthObject,
) -> Result<Vec<T>, ApiError> {
    let mut approved = Vec::with_capacity(items.len());
    for item in items {
        match approver.approved(&object(&item)) {
            Ok(true) => approved.push(item),
            Ok(false) => {}
            Err(error) => return Err(ApiError::Internal(error.to_string())),
        }
    }
    Ok(approved)
}

async fn get_frameworks(
    state: &AppState,
    principal: Option<&str>,
) -> Result<CallOutcome, ApiError> {
    let approver = approver_for(state, principal, Action::ViewFramework).await?;
    let frameworks = state
        .registry
        .frameworks()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let frameworks = filter_approved(frameworks, approver.as_ref(), |framework| AuthObject {
        framework: Some(framework.clone()),
        ..Default::default()
    })?;
    Ok(CallOutcome::Message(Response::GetFrameworks { frameworks }))
}

async fn get_executors(
    state: &AppState,
    principal: Option<&str>,
) -> Result<CallOutcome, ApiError> {
    let approver = approver_for(state, principal, Action::ViewExecutor).await?;
    let executors = state
        .registry
        .executors()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let executors = filter_approved(executors, approver.as_ref(), |executor| AuthObject {
        executor: Some(executor.clone()),
        ..Default::default()
    })?;
    Ok(CallOutcome::Message(Response::GetExecutors { executors }))
}

async fn get_tasks(state: &AppState, principal: Option<&str>) -> Result<CallOutcome, ApiError> {
    let approver = approver_for(state, principal, Action::ViewTask).await?;
    let tasks = state
        .registry
        .tasks()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let tasks = filter_approved(tasks, approver.as_ref(), |_| AuthObject::default())?;
    Ok(CallOutcome::Message(Response::GetTasks { tasks }))
}
