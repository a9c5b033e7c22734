//! Engine module for ReplayEngine implementation
//!
//! Provides the replay engine, its builder, the per-pass flow context and the
//! dispatch contract (invocation request/response, run listeners).

pub mod builder;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod flow;
mod flow_ctx;
pub mod registry;

pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use self::core::ReplayEngine;
pub use dispatch::{Invocation, InvocationResponse, RunListener};
pub use flow::{flow_fn, Flow, FnFlow};
pub use flow_ctx::FlowCtx;
pub use registry::FlowRegistry;
