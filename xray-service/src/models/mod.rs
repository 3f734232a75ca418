//! Domain models for the X-ray analysis service.

pub mod analysis;
pub mod media;

pub use analysis::{Analysis, AnalysisRequest, AnalysisResult};
pub use media::{MediaError, MediaReference};
