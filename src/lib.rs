//! Cluster-node agent control plane for nested containers.
//!
//! The agent exposes one call-based HTTP endpoint: callers POST a typed
//! `Call` and receive a typed `Response`, optionally as a framed record
//! stream. Nested containers are auxiliary containers launched beneath an
//! already-running task's container, used for debug/exec-style sessions;
//! the agent manages their lifecycle and relays their standard I/O.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                 NESTED AGENT                  │
//!  POST /api/v1         │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!  ─────────────────────┼─▶│   api   │──▶│   auth   │──▶│containers │──┼──▶ containerizer
//!                       │  │dispatch │   │   gate   │   │ lifecycle │  │    (external)
//!                       │  └─────────┘   └──────────┘   └─────┬─────┘  │
//!                       │       │                             │        │
//!  streamed records     │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!  ◀────────────────────┼──│   io    │◀──│  state   │   │    io     │◀─┼──── switchboard
//!                       │  │ relays  │   │ registry │   │  relays   │  │     connection
//!                       │  └─────────┘   └──────────┘   └───────────┘  │
//!                       │                                              │
//!                       │  config · lifecycle · observability          │
//!                       └──────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod api;
pub mod config;
pub mod containerizer;
pub mod containers;
pub mod io;
pub mod state;

// Cross-cutting concerns
pub mod auth;
pub mod lifecycle;
pub mod observability;

pub use api::HttpServer;
pub use config::AgentConfig;
pub use lifecycle::Shutdown;
pub use state::Registry;
