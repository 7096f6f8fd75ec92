//! Payload model shared by modules and their callers.
//!
//! Messages are JSON-first: every type is a serde struct with container-level
//! `#[serde(default)]` and is constructed leniently through
//! [`ModuleMessage::from_payload`].

pub mod base;
pub mod manager;
pub mod orchestrator;

pub use base::{ModuleMessage, ModuleRequest, ModuleResponse};

pub use manager::{ManagerRunRequest, ManagerRunResult, ToolDefinition, ToolRegistry};

pub use orchestrator::{Capability, CapabilityRegistry};
