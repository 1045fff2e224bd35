//! Agent API subsystem.
//!
//! # Data Flow
//! ```text
//! POST /api/v1
//!     → server.rs (axum router, shared state)
//!     → dispatch.rs (content negotiation, decode, route)
//!     → call.rs (devolve to the internal schema, validate)
//!     → containers / state / auth (do the work)
//!     → dispatch.rs (evolve + encode the outcome)
//!
//! POST /api/v1/executor
//!     → executor.rs (same negotiation, executor call set)
//! ```

pub mod call;
pub mod content_type;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod server;
pub mod types;
pub mod v1;

pub use content_type::ContentType;
pub use error::ApiError;
pub use server::{AppState, HttpServer};
