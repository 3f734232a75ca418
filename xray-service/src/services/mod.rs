pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod providers;

pub use pipeline::{AnalysisError, AnalysisPipeline};
