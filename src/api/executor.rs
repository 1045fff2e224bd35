//! Executor-facing endpoint.
//!
//! Tasks' own executors talk to the agent here, not external operators. The
//! endpoint shares the operator API's content negotiation but carries a
//! smaller call set: SUBSCRIBE registers the executor and streams events
//! back, UPDATE and MESSAGE are fire-and-forget. The endpoint is
//! unauthenticated; only local executors can reach it.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::IntoResponse;

use crate::io::pipe::pipe;
use crate::io::recordio::encode_frame;

use super::call::CallOutcome;
use super::content_type::ContentType;
use super::dispatch::{encode_outcome, extract_content_type, negotiate};
use super::error::ApiError;
use super::server::AppState;
use super::v1;

/// Entry point for `POST /api/v1/executor`.
pub async fn handle_executor(
    State(state): State<AppState>,
    request: Request<Body>,
) -> axum::response::Response {
    match executor_api(state, request).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn executor_api(
    state: AppState,
    request: Request<Body>,
) -> Result<axum::response::Response, ApiError> {
    if !state.registry.recovered() {
        return Err(ApiError::ServiceUnavailable(
            "Agent has not finished recovery".into(),
        ));
    }

    let (parts, body) = request.into_parts();
    let content_type = extract_content_type(&parts.headers)?;
    let accept = negotiate(&parts.headers)?;

    if content_type.is_streaming() {
        return Err(ApiError::UnsupportedMediaType(format!(
            "Streaming 'Content-Type' {content_type} is not supported for executor calls"
        )));
    }

    let bytes = axum::body::to_bytes(body, state.config.api.max_body_size)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {e}")))?;
    let call: v1::ExecutorCall =
        v1::deserialize_message(content_type, &bytes).map_err(ApiError::BadRequest)?;

    let outcome = match call.call_type() {
        v1::ExecutorCallType::Unknown => {
            return Err(ApiError::NotImplemented("Unknown executor call type".into()))
        }
        v1::ExecutorCallType::Subscribe => subscribe(&state, call, accept).await?,
        v1::ExecutorCallType::Update => update(&state, call).await?,
        v1::ExecutorCallType::Message => message(call)?,
    };

    encode_outcome(outcome, accept)
}

/// Register the executor with the agent state and stream events back,
/// starting with SUBSCRIBED. The stream stays open until the executor
/// disconnects; its registration survives the disconnect so operators can
/// still resolve its containers.
async fn subscribe(
    state: &AppState,
    call: v1::ExecutorCall,
    accept: ContentType,
) -> Result<CallOutcome, ApiError> {
    let subscribe = call
        .subscribe
        .ok_or_else(|| ApiError::BadRequest("Expecting 'subscribe' to be present".into()))?;

    let framework = subscribe
        .framework_info
        .ok_or_else(|| ApiError::BadRequest("Expecting 'subscribe.framework_info'".into()))?;
    if framework.id.is_none() {
        return Err(ApiError::BadRequest(
            "Expecting 'subscribe.framework_info.id' to be present".into(),
        ));
    }

    let executor = subscribe
        .executor_info
        .ok_or_else(|| ApiError::BadRequest("Expecting 'subscribe.executor_info'".into()))?;
    if executor.executor_id.is_none() {
        return Err(ApiError::BadRequest(
            "Expecting 'subscribe.executor_info.executor_id' to be present".into(),
        ));
    }

    let container_id = subscribe
        .container_id
        .ok_or_else(|| ApiError::BadRequest("Expecting 'subscribe.container_id'".into()))?;

    let executor_name = executor
        .executor_id
        .as_ref()
        .map(|id| id.value.clone())
        .unwrap_or_default();

    state
        .registry
        .register_executor(framework, executor, container_id, subscribe.user)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(executor = %executor_name, "Executor subscribed");

    let record_type = accept.record_type();
    let event = v1::ExecutorEvent {
        r#type: v1::ExecutorEventType::Subscribed as i32,
        subscribed: Some(v1::ExecutorSubscribed {
            agent_version: env!("CARGO_PKG_VERSION").into(),
        }),
    };
    let frame = encode_frame(
        &v1::serialize_message(record_type, &event).map_err(ApiError::Internal)?,
    );

    let (mut writer, reader) = pipe();
    tokio::spawn(async move {
        if writer.write(frame).await.is_err() {
            return;
        }
        // Hold the stream open until the executor goes away.
        writer.reader_closed().await;
        writer.close();
    });

    Ok(CallOutcome::Stream {
        content_type: accept,
        reader,
    })
}

/// Record a task status update. 202: the acknowledgment is the status code.
async fn update(state: &AppState, call: v1::ExecutorCall) -> Result<CallOutcome, ApiError> {
    let framework_id = call
        .framework_id
        .ok_or_else(|| ApiError::BadRequest("Expecting 'framework_id' to be present".into()))?;
    let executor_id = call
        .executor_id
        .ok_or_else(|| ApiError::BadRequest("Expecting 'executor_id' to be present".into()))?;
    let status = call
        .update
        .and_then(|update| update.status)
        .ok_or_else(|| ApiError::BadRequest("Expecting 'update.status' to be present".into()))?;

    let recorded = state
        .registry
        .record_task_status(framework_id.value, executor_id.value, status)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !recorded {
        return Err(ApiError::BadRequest(
            "Update from an executor that is not subscribed".into(),
        ));
    }

    Ok(CallOutcome::Accepted)
}

fn message(call: v1::ExecutorCall) -> Result<CallOutcome, ApiError> {
    let message = call
        .message
        .ok_or_else(|| ApiError::BadRequest("Expecting 'message' to be present".into()))?;

    tracing::debug!(bytes = message.data.len(), "Executor message received");
    Ok(CallOutcome::Accepted)
}
