//! # Runscribe - Run Recorder and AsciiDoc Report Renderer
//!
//! Runscribe observes the lifecycle events of an orchestration run (plays,
//! tasks, handlers and per-host results) and keeps a browsable AsciiDoc
//! report tree on disk up to date while the run is still in progress.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │         Engine hooks (RunCallback) / JSONL RunEvents          │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                Recorder (event dispatch)                      │
//! │   names ─ status classification ─ aggregation store           │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │   Views ─ ReportRenderer (minijinja, compiled cache)           │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │         ArtifactWriter (atomic writes under the run dir)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use runscribe::prelude::*;
//! use serde_json::json;
//!
//! let mut recorder = Recorder::new(RecorderConfig::default());
//! recorder.on_run_start();
//! recorder.on_play_start("site", "play-1", None);
//! recorder.on_task_start(&TaskInfo::new("t1", "install nginx", "package"), false);
//! recorder.on_host_result("t1", "web1", OutcomeKind::Ok, false, json!({"changed": true}));
//! recorder.on_run_end();
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod recorder;
pub mod report;

/// Commonly used types.
pub mod prelude {
    pub use crate::callback::{RunCallback, RunEvent, SharedRecorder, TaskInfo};
    pub use crate::config::{Config, RecorderConfig};
    pub use crate::error::{Error, ErrorContext, Result};
    pub use crate::recorder::{
        AggregationStore, HostStatus, OutcomeKind, Recorder, RecorderState, StatusCounts,
    };
    pub use crate::report::{
        ArtifactWriter, CacheKeyPolicy, ReportRenderer, UndefinedMode, VariableBag,
    };
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
