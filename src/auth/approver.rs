//! Capability checks for API calls.
//!
//! # Responsibilities
//! - Resolve an `ObjectApprover` per (subject, action) pair
//! - Keep the three-valued outcome explicit: allow, deny, evaluation error
//! - Substitute an always-allow approver when no authorizer is configured
//!
//! An approver is resolved asynchronously once per call and then applied
//! synchronously to each object for the call's duration; it is never
//! re-resolved mid-stream.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::api::types::{CommandInfo, ExecutorInfo, FrameworkInfo};

/// Failure of the authorization subsystem itself. Surfaced as an internal
/// error, never coerced into a deny.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("authorization backend error: {0}")]
pub struct AuthorizationError(pub String);

/// Action an approver is scoped to, one per authorization-sensitive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    ViewFramework,
    ViewTask,
    ViewExecutor,
    ViewFlags,
    LaunchNestedContainer,
    LaunchNestedContainerSession,
    WaitNestedContainer,
    KillNestedContainer,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewFramework => "VIEW_FRAMEWORK",
            Action::ViewTask => "VIEW_TASK",
            Action::ViewExecutor => "VIEW_EXECUTOR",
            Action::ViewFlags => "VIEW_FLAGS",
            Action::LaunchNestedContainer => "LAUNCH_NESTED_CONTAINER",
            Action::LaunchNestedContainerSession => "LAUNCH_NESTED_CONTAINER_SESSION",
            Action::WaitNestedContainer => "WAIT_NESTED_CONTAINER",
            Action::KillNestedContainer => "KILL_NESTED_CONTAINER",
        }
    }
}

/// The caller on whose behalf an action is evaluated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Subject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

/// The object an action applies to. Fields are filled per call type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuthObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandInfo>,
}

/// A resolved capability predicate.
pub trait ObjectApprover: Send + Sync {
    /// `Ok(true)` allows, `Ok(false)` denies, `Err(_)` is an evaluation
    /// failure distinct from a deny.
    fn approved(&self, object: &AuthObject) -> Result<bool, AuthorizationError>;
}

/// Approver that allows everything.
///
/// Installed when the agent runs without an authorizer: authorization is
/// fail-open by explicit policy in that deployment mode, matching the
/// behavior operators already rely on. Do not change this silently.
pub struct AcceptingObjectApprover;

impl ObjectApprover for AcceptingObjectApprover {
    fn approved(&self, _object: &AuthObject) -> Result<bool, AuthorizationError> {
        Ok(true)
    }
}

/// Source of approvers, resolved once per call.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn get_object_approver(
        &self,
        subject: Subject,
        action: Action,
    ) -> Result<Box<dyn ObjectApprover>, AuthorizationError>;
}

/// Resolve the approver for `action`, substituting [`AcceptingObjectApprover`]
/// when no authorizer is configured.
pub async fn resolve_approver(
    authorizer: Option<&Arc<dyn Authorizer>>,
    principal: Option<&str>,
    action: Action,
) -> Result<Box<dyn ObjectApprover>, AuthorizationError> {
    match authorizer {
        Some(authorizer) => {
            let subject = Subject {
                principal: principal.map(str::to_owned),
            };
            authorizer.get_object_approver(subject, action).await
        }
        None => Ok(Box::new(AcceptingObjectApprover)),
    }
}

/// Delegating authorizer that consults an external authorization service.
///
/// The service is asked once per (subject, action) resolution and returns a
/// verdict the approver then applies to every object of the call.
pub struct HttpAuthorizer {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Serialize)]
struct AuthorizationRequest<'a> {
    subject: &'a Subject,
    action: &'a str,
}

#[derive(Deserialize)]
struct AuthorizationReply {
    verdict: String,
}

struct VerdictApprover {
    allowed: bool,
}

impl ObjectApprover for VerdictApprover {
    fn approved(&self, _object: &AuthObject) -> Result<bool, AuthorizationError> {
        Ok(self.allowed)
    }
}

impl HttpAuthorizer {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn get_object_approver(
        &self,
        subject: Subject,
        action: Action,
    ) -> Result<Box<dyn ObjectApprover>, AuthorizationError> {
        let request = AuthorizationRequest {
            subject: &subject,
            action: action.as_str(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthorizationError(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthorizationError(format!(
                "service returned {}",
                response.status()
            )));
        }

        let reply: AuthorizationReply = response
            .json()
            .await
            .map_err(|e| AuthorizationError(format!("malformed reply: {e}")))?;

        match reply.verdict.as_str() {
            "allow" => Ok(Box::new(VerdictApprover { allowed: true })),
            "deny" => Ok(Box::new(VerdictApprover { allowed: false })),
            other => Err(AuthorizationError(format!("unknown verdict {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_authorizer_substitutes_an_accepting_approver() {
        let approver = resolve_approver(None, Some("operator"), Action::ViewFlags)
            .await
            .unwrap();
        assert_eq!(approver.approved(&AuthObject::default()), Ok(true));
    }

    #[test]
    fn deny_and_error_are_distinct_outcomes() {
        struct Denying;
        impl ObjectApprover for Denying {
            fn approved(&self, _: &AuthObject) -> Result<bool, AuthorizationError> {
                Ok(false)
            }
        }

        struct Broken;
        impl ObjectApprover for Broken {
            fn approved(&self, _: &AuthObject) -> Result<bool, AuthorizationError> {
                Err(AuthorizationError("backend down".into()))
            }
        }

        assert_eq!(Denying.approved(&AuthObject::default()), Ok(false));
        assert!(Broken.approved(&AuthObject::default()).is_err());
    }
}
