//! Run recording: naming, classification, aggregation and dispatch.
//!
//! Data flows one way: an event reaches the [`Recorder`], which resolves
//! names ([`names`]), classifies results ([`status`]), mutates the
//! [`AggregationStore`] and then asks the report layer to re-render every
//! view the mutation touched.

pub mod activity;
pub mod counters;
pub mod diff;
pub mod dispatcher;
pub mod names;
pub mod status;
pub mod store;

pub use activity::{ActivityWindow, TaskActivity};
pub use counters::{ScopedCounters, StatusCounts};
pub use dispatcher::{Recorder, RecorderState};
pub use names::{NameRegistry, ResolvedName};
pub use status::{classify, Classification, HostStatus, OutcomeKind};
pub use store::{
    AggregationStore, HostResult, PlayAggregate, Run, TaskRecord, TaskRef, TimelineEntry,
};
