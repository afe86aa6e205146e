//! Deterministic test doubles and shared fixtures.
//!
//! Everything the loop touches externally goes through the
//! [`TextCompletion`](crate::collaborator::TextCompletion) and
//! [`CodeExecutor`](crate::collaborator::CodeExecutor) traits, so a full
//! run can be scripted: queue JSON replies on a [`MockTextCompletion`],
//! map inputs to outputs on a [`MockCodeExecutor`], and the controller
//! behaves identically every time.

pub mod fixtures;
pub mod mocks;

pub use mocks::{MockCodeExecutor, MockTextCompletion};
