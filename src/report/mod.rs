//! Report rendering and persistence.

pub mod renderer;
pub mod templates;
pub mod views;
pub mod writer;

pub use renderer::{
    BagValue, CacheKeyPolicy, ReportRenderer, TemplateCacheKey, UndefinedMode, VariableBag,
};
pub use writer::ArtifactWriter;
