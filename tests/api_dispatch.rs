//! Request-shape and dispatch tests for the operator API endpoint:
//! content negotiation, body decoding, and call routing.

use std::sync::Arc;

use nested_agent::api::v1;
use nested_agent::io::recordio::{encode_frame, FrameDecoder};

mod common;

use common::*;

#[tokio::test]
async fn missing_content_type_is_a_bad_request() {
    let agent = spawn_agent(None).await;

    let response = agent
        .client
        .post(agent.api_url())
        .header("accept", "application/json")
        .body(r#"{"type":"GET_HEALTH"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unrecognized_content_type_is_unsupported() {
    let agent = spawn_agent(None).await;

    let response = agent
        .client
        .post(agent.api_url())
        .header("content-type", "text/plain")
        .body(r#"{"type":"GET_HEALTH"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 415);
}

#[tokio::test]
async fn non_post_methods_are_rejected() {
    let agent = spawn_agent(None).await;

    let response = agent.client.get(agent.api_url()).send().await.unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn unrecovered_agent_is_unavailable() {
    let agent = spawn_agent_with(None, false).await;

    let response = agent
        .post_json(serde_json::json!({"type": "GET_HEALTH"}))
        .await;
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn unknown_call_type_is_not_implemented() {
    let agent = spawn_agent(None).await;

    let response = agent
        .post_json(serde_json::json!({"type": "UNKNOWN"}))
        .await;
    assert_eq!(response.status(), 501);

    // A missing type field means the same thing.
    let response = agent.post_json(serde_json::json!({})).await;
    assert_eq!(response.status(), 501);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let agent = spawn_agent(None).await;

    let response = agent
        .client
        .post(agent.api_url())
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn missing_payload_fails_validation() {
    let agent = spawn_agent(None).await;

    let response = agent
        .post_json(serde_json::json!({"type": "WAIT_NESTED_CONTAINER"}))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn streaming_precedence_wins_the_accept_negotiation() {
    let agent = spawn_agent(None).await;

    let response = agent
        .client
        .post(agent.api_url())
        .header("content-type", "application/json")
        .header("accept", "application/json, application/recordio+protobuf")
        .body(r#"{"type":"GET_HEALTH"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/recordio+protobuf"
    );

    // The single response message arrives as one self-delimited frame.
    let body = response.bytes().await.unwrap();
    let mut decoder = FrameDecoder::new();
    let frames = decoder.decode(&body).unwrap();
    assert_eq!(frames.len(), 1);

    let wire: v1::Response = prost::Message::decode(frames[0].as_ref()).unwrap();
    assert_eq!(wire.get_health.unwrap().healthy, true);
}

#[tokio::test]
async fn unsupported_accept_is_not_acceptable() {
    let agent = spawn_agent(None).await;

    let response = agent
        .client
        .post(agent.api_url())
        .header("content-type", "application/json")
        .header("accept", "text/html")
        .body(r#"{"type":"GET_HEALTH"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 406);
}

#[tokio::test]
async fn health_and_version_respond_in_json() {
    let agent = spawn_agent(None).await;

    let response = agent
        .post_json(serde_json::json!({"type": "GET_HEALTH"}))
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "GET_HEALTH");
    assert_eq!(body["get_health"]["healthy"], true);

    let response = agent
        .post_json(serde_json::json!({"type": "GET_VERSION"}))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["get_version"]["version_info"]["version"],
        env!("CARGO_PKG_VERSION")
    );
}

#[tokio::test]
async fn kill_without_a_matching_executor_is_not_found() {
    let agent = spawn_agent(None).await;

    let response = agent
        .client
        .post(agent.api_url())
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .body(r#"{"type":"KILL_NESTED_CONTAINER","kill_nested_container":{"container_id":{"value":"c1"}}}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn streaming_content_type_is_rejected_for_non_attach_calls() {
    let agent = spawn_agent(None).await;

    // The first record of the stream resolves to WAIT_NESTED_CONTAINER,
    // which does not support streaming requests.
    let record = serde_json::to_vec(&wait_call("c1")).unwrap();
    let body = encode_frame(&record);

    let response = agent
        .client
        .post(agent.api_url())
        .header("content-type", "application/recordio+json")
        .header("accept", "application/json")
        .body(body.to_vec())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 415);
}

#[tokio::test]
async fn attach_input_requires_a_streaming_content_type() {
    let agent = spawn_agent(None).await;

    let response = agent
        .post_json(serde_json::json!({
            "type": "ATTACH_CONTAINER_INPUT",
            "attach_container_input": {
                "type": "CONTAINER_ID",
                "container_id": {"value": "c1"}
            }
        }))
        .await;

    assert_eq!(response.status(), 415);
}

#[tokio::test]
async fn streaming_body_with_no_records_is_a_bad_request() {
    let agent = spawn_agent(None).await;

    let response = agent
        .client
        .post(agent.api_url())
        .header("content-type", "application/recordio+json")
        .header("accept", "application/json")
        .body(Vec::new())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn get_flags_is_gated_on_view_flags() {
    let agent = spawn_agent(Some(Arc::new(StaticAuthorizer { allow: false }))).await;

    let response = agent.post_json(serde_json::json!({"type": "GET_FLAGS"})).await;
    assert_eq!(response.status(), 403);

    // Health is not authorization-sensitive; a deny-all authorizer does
    // not affect it.
    let response = agent
        .post_json(serde_json::json!({"type": "GET_HEALTH"}))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn get_flags_reports_the_configuration() {
    let agent = spawn_agent(None).await;

    let response = agent.post_json(serde_json::json!({"type": "GET_FLAGS"})).await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let flags = body["get_flags"]["flags"].as_array().unwrap();
    assert!(flags
        .iter()
        .any(|flag| flag["name"] == "listener.bind_address"));
}

#[tokio::test]
async fn framework_projections_filter_on_deny() {
    let agent = spawn_agent(Some(Arc::new(StaticAuthorizer { allow: false }))).await;
    register_executor(&agent.registry, "e1", "exec").await;

    // Denied items are filtered out, not an error.
    let response = agent
        .post_json(serde_json::json!({"type": "GET_FRAMEWORKS"}))
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["get_frameworks"]["frameworks"].is_null());
}

#[tokio::test]
async fn executor_subscribe_registers_and_streams_events() {
    let agent = spawn_agent(None).await;

    let subscribe = serde_json::json!({
        "type": "SUBSCRIBE",
        "subscribe": {
            "framework_info": {"id": {"value": "f1"}, "name": "fw", "user": "agent"},
            "executor_info": {"executor_id": {"value": "e1"}},
            "container_id": {"value": "exec"}
        }
    });

    let response = agent
        .client
        .post(agent.executor_url())
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .json(&subscribe)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The first streamed frame is the SUBSCRIBED event.
    let mut stream = response;
    let chunk = stream.chunk().await.unwrap().unwrap();
    let mut decoder = FrameDecoder::new();
    let frames = decoder.decode(&chunk).unwrap();
    let event: v1::ExecutorEvent = serde_json::from_slice(&frames[0]).unwrap();
    assert_eq!(event.r#type, v1::ExecutorEventType::Subscribed as i32);
    assert_eq!(
        event.subscribed.unwrap().agent_version,
        env!("CARGO_PKG_VERSION")
    );

    // The registration makes the executor resolvable for launches.
    let response = agent.post_json(launch_call("debug", "exec")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(agent.containerizer.launch_count(), 1);

    // Updates from the subscribed executor are accepted.
    let update = serde_json::json!({
        "type": "UPDATE",
        "framework_id": {"value": "f1"},
        "executor_id": {"value": "e1"},
        "update": {"status": {"task_id": {"value": "t1"}, "state": "TASK_RUNNING"}}
    });
    let response = agent
        .client
        .post(agent.executor_url())
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    let response = agent.post_json(serde_json::json!({"type": "GET_TASKS"})).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["get_tasks"]["tasks"][0]["state"], "TASK_RUNNING");
}

#[tokio::test]
async fn executor_update_from_unknown_executor_is_rejected() {
    let agent = spawn_agent(None).await;

    let update = serde_json::json!({
        "type": "UPDATE",
        "framework_id": {"value": "f1"},
        "executor_id": {"value": "ghost"},
        "update": {"status": {"task_id": {"value": "t1"}, "state": "TASK_RUNNING"}}
    });

    let response = agent
        .client
        .post(agent.executor_url())
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .json(&update)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}
