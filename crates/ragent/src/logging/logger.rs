use anyhow::{Context, Result};
use flume::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::types::ActivityLog;
use crate::config::ActivityConfig;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Max logs held in memory before new ones are dropped
    pub queue_capacity: usize,
    /// Lines appended per write
    pub batch_size: usize,
    /// Max wait before a partial batch is flushed (milliseconds)
    pub batch_timeout_ms: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
        }
    }
}

impl From<&ActivityConfig> for LoggerConfig {
    fn from(config: &ActivityConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            batch_size: config.batch_size.max(1),
            batch_timeout_ms: config.batch_timeout_ms,
        }
    }
}

/// Queue-backed activity journal appending JSON lines to a file
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Option<Sender<ActivityLog>>,
}

impl ActivityLogger {
    /// Spawn the background writer; must be called inside a tokio runtime
    pub fn new(path: impl Into<PathBuf>, config: LoggerConfig) -> Self {
        let path = path.into();
        let (sender, receiver) = bounded(config.queue_capacity);

        info!(
            "Initializing ActivityLogger: queue={}, batch={}, timeout={}ms, file={}",
            config.queue_capacity,
            config.batch_size,
            config.batch_timeout_ms,
            path.display()
        );

        tokio::spawn(async move {
            Self::worker_loop(path, receiver, config).await;
        });

        Self {
            sender: Some(sender),
        }
    }

    /// Logger that drops everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn from_settings(config: &ActivityConfig) -> Self {
        if config.enabled {
            Self::new(config.path.clone(), LoggerConfig::from(config))
        } else {
            info!("Activity journal disabled");
            Self::disabled()
        }
    }

    /// Fire-and-forget; drops the entry with a warning when the queue is full
    pub fn log(&self, activity: ActivityLog) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(activity) {
            warn!("Failed to enqueue activity log (queue full?): {}", e);
        }
    }

    async fn worker_loop(path: PathBuf, receiver: Receiver<ActivityLog>, config: LoggerConfig) {
        info!("Activity writer started");

        let mut batch: Vec<ActivityLog> = Vec::with_capacity(config.batch_size);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms);

        loop {
            let deadline = tokio::time::Instant::now() + batch_timeout;

            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => batch.push(log),
                    Ok(Err(_)) => {
                        // Every sender dropped: flush and exit
                        if !batch.is_empty() {
                            Self::flush_batch(&path, &batch).await;
                        }
                        info!("Activity writer shutting down (channel closed)");
                        return;
                    }
                    Err(_) => break,
                }
            }

            if !batch.is_empty() {
                Self::flush_batch(&path, &batch).await;
                batch.clear();
            } else {
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    async fn flush_batch(path: &Path, batch: &[ActivityLog]) {
        let start = std::time::Instant::now();
        match Self::append_lines(path, batch).await {
            Ok(written) => debug!("Appended {} activity logs in {:?}", written, start.elapsed()),
            Err(e) => error!("Failed to append activity batch: {:#}", e),
        }
    }

    async fn append_lines(path: &Path, logs: &[ActivityLog]) -> Result<usize> {
        let mut buf = Vec::new();
        for log in logs {
            serde_json::to_writer(&mut buf, log).context("Failed to serialize activity log")?;
            buf.push(b'\n');
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(&buf).await?;
        file.flush().await?;

        Ok(logs.len())
    }

    pub fn queue_len(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logging::{ActivityStatus, ActivityType};

    pub(crate) async fn wait_for_lines(path: &Path, expected: usize) -> Vec<String> {
        for _ in 0..50 {
            if let Ok(text) = tokio::fs::read_to_string(path).await {
                let lines: Vec<String> = text.lines().map(str::to_string).collect();
                if lines.len() >= expected {
                    return lines;
                }
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("activity file never reached {} lines", expected);
    }

    #[tokio::test]
    async fn test_logs_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("activity.jsonl");
        let logger = ActivityLogger::new(
            path.clone(),
            LoggerConfig {
                batch_timeout_ms: 20,
                ..LoggerConfig::default()
            },
        );

        for i in 0..3 {
            logger.log(
                ActivityLog::builder(1, i, ActivityType::CommandHandled)
                    .command("status")
                    .build(),
            );
        }

        let lines = wait_for_lines(&path, 3).await;
        let parsed: ActivityLog = serde_json::from_str(&lines[2]).unwrap();
        assert_eq!(parsed.user_id, 2);
        assert_eq!(parsed.activity_status, ActivityStatus::Success);
        assert_eq!(parsed.command.as_deref(), Some("status"));
    }

    #[tokio::test]
    async fn test_disabled_logger_is_silent() {
        let logger = ActivityLogger::disabled();
        logger.log(ActivityLog::builder(1, 1, ActivityType::AnswerSent).build());
        assert!(!logger.is_enabled());
        assert_eq!(logger.queue_len(), 0);
    }
}
