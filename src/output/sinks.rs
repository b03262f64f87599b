//! Built-in content sinks

use crate::crawler::{ExtractedContent, ExtractedPayload};
use crate::output::traits::{ContentSink, SinkResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one JSON object per line to a file
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it and its parent directory if needed
    pub async fn open(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContentSink for JsonLinesSink {
    async fn deliver(&self, content: &ExtractedContent) -> SinkResult<()> {
        let mut line = serde_json::to_vec(content)?;
        line.push(b'\n');

        // One write per record keeps lines whole between concurrent deliveries
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Logs a one-line summary of each item and keeps nothing
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl ContentSink for LogSink {
    async fn deliver(&self, content: &ExtractedContent) -> SinkResult<()> {
        let summary = match &content.payload {
            ExtractedPayload::Text(text) => format!("{} chars of text", text.chars().count()),
            ExtractedPayload::Images(images) => {
                let srcs: Vec<&str> = images.iter().map(|i| i.src.as_str()).collect();
                format!("image {}", srcs.join(", "))
            }
            ExtractedPayload::Videos(videos) => {
                let srcs: Vec<&str> = videos.iter().map(|v| v.src.as_str()).collect();
                format!("video {}", srcs.join(", "))
            }
        };

        tracing::info!(
            source_id = %content.source_id,
            url = %content.url,
            content_type = %content.content_type,
            "Extracted {}",
            summary
        );
        Ok(())
    }
}
