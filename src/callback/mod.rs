//! Engine-facing event surface.
//!
//! An orchestration engine reports a run either by calling the hooks of
//! [`RunCallback`] (implemented by [`SharedRecorder`]) or by producing
//! [`RunEvent`] values, e.g. as JSON lines, that are fed to
//! [`Recorder::handle`](crate::recorder::Recorder::handle).

pub mod events;
pub mod shared;

pub use events::{RunEvent, TaskInfo};
pub use shared::{RunCallback, SharedRecorder};
