//! Observability utilities.

mod logging;
mod run_summary;

pub use logging::{init_tracing, LogFormat, NOISY_MODULES};
pub use run_summary::{RunOutcome, RunSummary};
