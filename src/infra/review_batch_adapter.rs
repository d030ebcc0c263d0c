use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::app::ports::ReviewBatchPort;
use crate::pipeline::ReviewItem;

/// File-based implementation of ReviewBatchPort.
/// Writes one review item per line (NDJSON).
pub struct FileReviewBatchAdapter {
    file_writer: Mutex<BufWriter<std::fs::File>>,
    file_path: String,
}

impl FileReviewBatchAdapter {
    pub fn new(file_path: &str) -> crate::error::Result<Self> {
        let path = Path::new(file_path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        info!("Creating review batch file: {}", file_path);

        let file_writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(file_path)?,
        );

        Ok(Self {
            file_writer: Mutex::new(file_writer),
            file_path: file_path.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ReviewBatchPort for FileReviewBatchAdapter {
    async fn write_items(&self, items: &[ReviewItem]) -> anyhow::Result<usize> {
        let mut writer = self
            .file_writer
            .lock()
            .map_err(|_| anyhow::anyhow!("review batch writer lock poisoned"))?;
        for item in items {
            let json_line = serde_json::to_string(item)?;
            writeln!(writer, "{}", json_line)?;
        }
        writer.flush()?;
        Ok(items.len())
    }

    fn location(&self) -> String {
        self.file_path.clone()
    }
}
