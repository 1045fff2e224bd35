//! Agent runtime state.
//!
//! # Design Decisions
//! - Shared mutable tables live on one actor task; handlers never touch
//!   them directly, they enqueue commands and await replies
//! - Lookups return owned snapshots so no reference escapes the actor

pub mod registry;

pub use registry::{matches_exact_or_parent, Registry, RegistryError, ResolvedExecutor};
