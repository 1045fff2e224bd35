//! Authorization gate.
//!
//! # Data Flow
//! ```text
//! call handler
//!     → resolve_approver (async, once per call)
//!     → ObjectApprover::approved (sync, per object)
//!     → allow / deny (403) / evaluation error (500)
//! ```

pub mod approver;

pub use approver::{
    resolve_approver, AcceptingObjectApprover, Action, AuthObject, AuthorizationError,
    Authorizer, HttpAuthorizer, ObjectApprover, Subject,
};
