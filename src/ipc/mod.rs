//! Inter-process messaging.
//!
//! # Data Flow
//! ```text
//! worker stdout ──NDJSON──▶ master (Supervisor reads each worker's pipe)
//! master stdout ──NDJSON──▶ launching CLI (`start` waits for READY or error)
//! master ──JSON config──▶ worker stdin (once, at spawn)
//! ```
//!
//! # Design Decisions
//! - One tagged union validated by serde on both ends; unknown shapes are rejected
//! - stdout carries only IPC lines; logs go to stderr

pub mod codec;
pub mod message;

pub use codec::{IpcError, IpcReader, IpcSender};
pub use message::{ErrorInfo, InfoName, IpcMessage};
