//! Application-level orchestration utilities.
//!
//! This module owns the calculation session lifecycle (single-active-job
//! guard, worker spawn, cancellation) and post-run processing such as result
//! persistence, exports and auto-save. UI/CLI layers call into this module
//! to keep responsibilities separated.

mod controller;
mod post_process;

pub use controller::{JobSession, StartError};
pub(crate) use controller::{run_controller, ControllerParams, SessionEvent, UiCommand};
pub(crate) use post_process::{build_summary, process_run_completion, ProcessedRun};
