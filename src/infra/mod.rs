// File adapters implementing the application ports

pub mod override_source;
pub mod record_source;
pub mod review_batch_adapter;
pub mod scored_output_adapter;

pub use override_source::FileOverrideSource;
pub use record_source::{FileRecordSource, InputFormat};
pub use review_batch_adapter::FileReviewBatchAdapter;
pub use scored_output_adapter::{FileScoredOutputAdapter, OutputFormat};
