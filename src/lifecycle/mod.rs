//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! SIGTERM / ctrl-c
//!     → shutdown.rs (broadcast to all long-running tasks)
//!     → server stops accepting, drains sessions, exits
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
