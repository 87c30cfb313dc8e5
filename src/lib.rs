#![forbid(unsafe_code)]

//! Single-job coding-assistant worker.
//!
//! A worker process accepts one job, resolves or resumes its session,
//! materializes a workspace, runs the agent, optionally commits the result,
//! persists the session and exits.

pub mod config;
pub mod errors;
pub mod events;
pub mod execution;
pub mod models;
pub mod orchestrator;
pub mod server;
pub mod storage;
pub mod summarize;
pub mod vcs;
pub mod workspace;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
