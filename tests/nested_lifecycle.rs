//! Lifecycle tests for launch / wait / kill: parent resolution, the
//! authorization gate, and cleanup-on-failure.

use std::sync::Arc;

use nested_agent::api::types::ContainerId;
use nested_agent::containerizer::{ContainerClass, ContainerizerError, ContainerTermination};

mod common;

use common::*;

fn nested(id: &str, parent: &str) -> ContainerId {
    ContainerId::new(id).with_parent(ContainerId::new(parent))
}

#[tokio::test]
async fn deeper_nesting_is_rejected_before_the_containerizer() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    let call = serde_json::json!({
        "type": "LAUNCH_NESTED_CONTAINER",
        "launch_nested_container": {
            "container_id": {
                "value": "too-deep",
                "parent": {"value": "debug", "parent": {"value": "exec"}}
            },
            "command": {"shell": true, "value": "ls"}
        }
    });

    let response = agent.post_json(call).await;
    assert_eq!(response.status(), 501);
    assert_eq!(agent.containerizer.launch_count(), 0);
}

#[tokio::test]
async fn launch_with_unknown_parent_is_a_bad_request() {
    // Independent of authorization configuration: the parent is resolved
    // before the approver is applied.
    for authorizer in [
        None,
        Some(Arc::new(StaticAuthorizer { allow: false }) as Arc<dyn nested_agent::auth::Authorizer>),
    ] {
        let agent = spawn_agent(authorizer).await;

        let response = agent.post_json(launch_call("debug", "ghost")).await;
        assert_eq!(response.status(), 400);
        assert_eq!(agent.containerizer.launch_count(), 0);
    }
}

#[tokio::test]
async fn launch_without_a_parent_is_a_bad_request() {
    let agent = spawn_agent(None).await;

    let call = serde_json::json!({
        "type": "LAUNCH_NESTED_CONTAINER",
        "launch_nested_container": {
            "container_id": {"value": "orphan"},
            "command": {"shell": true, "value": "ls"}
        }
    });

    let response = agent.post_json(call).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn denied_launch_never_reaches_the_containerizer() {
    let agent = spawn_agent(Some(Arc::new(StaticAuthorizer { allow: false }))).await;
    register_executor(&agent.registry, "e1", "exec").await;

    let response = agent.post_json(launch_call("debug", "exec")).await;
    assert_eq!(response.status(), 403);
    assert_eq!(agent.containerizer.launch_count(), 0);
}

#[tokio::test]
async fn approver_evaluation_error_is_internal_not_forbidden() {
    let agent = spawn_agent(Some(Arc::new(BrokenAuthorizer))).await;
    register_executor(&agent.registry, "e1", "exec").await;

    let response = agent.post_json(launch_call("debug", "exec")).await;
    assert_eq!(response.status(), 500);
    assert_eq!(agent.containerizer.launch_count(), 0);
}

#[tokio::test]
async fn successful_launch_uses_the_executor_user() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    let response = agent.post_json(launch_call("debug", "exec")).await;
    assert_eq!(response.status(), 200);

    let launches = agent.containerizer.launches.lock().unwrap();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].container_id, nested("debug", "exec"));
    assert_eq!(launches[0].class, ContainerClass::Default);
    // The registered executor runs as "ops" and the command named no user.
    assert_eq!(launches[0].user.as_deref(), Some("ops"));
}

#[cfg(unix)]
#[tokio::test]
async fn command_user_overrides_the_executor_user() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    let call = serde_json::json!({
        "type": "LAUNCH_NESTED_CONTAINER",
        "launch_nested_container": {
            "container_id": {"value": "debug", "parent": {"value": "exec"}},
            "command": {"shell": true, "value": "ls", "user": "debugger"}
        }
    });

    let response = agent.post_json(call).await;
    assert_eq!(response.status(), 200);

    let launches = agent.containerizer.launches.lock().unwrap();
    assert_eq!(launches[0].user.as_deref(), Some("debugger"));
}

#[tokio::test]
async fn failed_launch_destroys_exactly_once_and_reports_the_launch_failure() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    agent
        .containerizer
        .push_launch(Err(ContainerizerError("fork failed".into())));
    // The cleanup destroy also failing must not change what the caller sees.
    agent
        .containerizer
        .push_destroy(Err(ContainerizerError("nothing to destroy".into())));

    let response = agent.post_json(launch_call("debug", "exec")).await;
    assert_eq!(response.status(), 500);
    assert!(response.text().await.unwrap().contains("fork failed"));

    assert_eq!(agent.containerizer.destroys_of(&nested("debug", "exec")), 1);
}

#[tokio::test]
async fn unsupported_container_info_is_a_bad_request_without_cleanup() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    agent.containerizer.push_launch(Ok(false));

    let response = agent.post_json(launch_call("debug", "exec")).await;
    assert_eq!(response.status(), 400);
    assert!(response.text().await.unwrap().contains("ContainerInfo"));

    // Nothing was created, so nothing is destroyed.
    assert!(agent.containerizer.destroys.lock().unwrap().is_empty());
}

#[tokio::test]
async fn wait_resolves_the_nested_container_and_its_parent_registration() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    agent.containerizer.push_wait(Ok(Some(ContainerTermination {
        exit_status: Some(7),
        message: None,
    })));
    agent.containerizer.push_wait(Ok(Some(ContainerTermination {
        exit_status: Some(7),
        message: None,
    })));

    // Addressing the nested container resolves through its parent.
    let call = serde_json::json!({
        "type": "WAIT_NESTED_CONTAINER",
        "wait_nested_container": {
            "container_id": {"value": "debug", "parent": {"value": "exec"}}
        }
    });
    let response = agent.post_json(call).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "WAIT_NESTED_CONTAINER");
    assert_eq!(body["wait_nested_container"]["exit_status"], 7);

    // Addressing the executor's own container resolves exactly.
    let response = agent.post_json(wait_call("exec")).await;
    assert_eq!(response.status(), 200);

    // Anything else is not found.
    let response = agent.post_json(wait_call("ghost")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn wait_on_an_unterminated_container_is_not_found() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    agent.containerizer.push_wait(Ok(None));

    let response = agent.post_json(wait_call("exec")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn wait_omits_the_exit_status_when_unknown() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    agent.containerizer.push_wait(Ok(Some(ContainerTermination {
        exit_status: None,
        message: Some("lost".into()),
    })));

    let response = agent.post_json(wait_call("exec")).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["wait_nested_container"]["exit_status"].is_null());
}

#[tokio::test]
async fn kill_maps_the_destroy_found_flag_to_the_status() {
    let agent = spawn_agent(None).await;
    register_executor(&agent.registry, "e1", "exec").await;

    let response = agent.post_json(kill_call("exec")).await;
    assert_eq!(response.status(), 200);

    // "Never existed" and "already killed" share the same answer.
    agent.containerizer.push_destroy(Ok(false));
    let response = agent.post_json(kill_call("exec")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn wait_and_kill_are_gated() {
    let agent = spawn_agent(Some(Arc::new(StaticAuthorizer { allow: false }))).await;
    register_executor(&agent.registry, "e1", "exec").await;

    let response = agent.post_json(wait_call("exec")).await;
    assert_eq!(response.status(), 403);

    let response = agent.post_json(kill_call("exec")).await;
    assert_eq!(response.status(), 403);
    assert!(agent.containerizer.destroys.lock().unwrap().is_empty());
}
