//! Domain model module declarations.

pub mod event;
pub mod job;
pub mod session;
