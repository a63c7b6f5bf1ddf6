//! Core types and error definitions for the toolwire crates.
//!
//! This crate provides the foundational types shared by the discovery
//! orchestrator and its command-line front end.
//!
//! # Main types
//!
//! - [`ToolwireError`]: Unified error enum covering configuration, connection,
//!   discovery, and request failures.
//! - [`ToolwireResult`]: Convenience alias for `Result<T, ToolwireError>`.
//! - [`ToolCall`]: A request to invoke a discovered tool.
//! - [`ToolResult`]: Content blocks returned by the server for a tool call.

pub mod error;
pub mod tool;

pub use error::{ToolwireError, ToolwireResult};
pub use tool::{ContentBlock, ToolCall, ToolResult};
