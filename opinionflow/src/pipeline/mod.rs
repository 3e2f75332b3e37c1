//! The analysis pipeline and its event stream.
//!
//! A run moves through planning, up to [`MAX_SEARCH_PASSES`] search+gate
//! passes, a concurrent fetch, and the report call. Every milestone is
//! yielded as a [`PipelineEvent`]; the last event is always `final` or
//! `error`.

mod controller;
mod events;

pub use controller::{
    material_summary, select_materials, select_pass, AnalysisPipeline, RunState, MAX_SEARCH_PASSES,
};
pub use events::{PipelineEvent, RunPlan, SearchMode};
