// Classification pipeline: processing stages, orchestration, and external review

pub mod orchestrator;
pub mod processing;
pub mod review;

// Re-export key types from each stage
pub use orchestrator::{ClassifiedBatch, ClassifiedRecord, Pipeline};
pub use processing::decision::{DecisionProvenance, ScoredRecord};
pub use review::merge::{MergeReport, OverrideBatch, ReviewOverride};
pub use review::{ReviewExporter, ReviewItem};
