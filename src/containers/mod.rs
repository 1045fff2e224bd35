//! Nested container lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! dispatched call
//!     → manager.rs (resolve executor → authorize → containerizer)
//!     → session.rs (destroy-once binding for DEBUG sessions)
//!     → io relays (attach input/output streams)
//! ```

pub mod manager;
pub mod session;

pub use manager::NestedContainerManager;
pub use session::{SessionDestroyer, SessionGuard, SessionId, SessionTracker};
