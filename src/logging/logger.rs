use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::{self, Duration};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Installs the global JSON subscriber writing to an hourly rolling file under `log_dir`.
///
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init_tracing(
    log_dir: impl AsRef<Path>,
    file_name: &str,
) -> Result<WorkerGuard, tracing::subscriber::SetGlobalDefaultError> {
    let log_file = rolling::hourly(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().json().with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}

enum LogCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Batched JSON-lines writer for audit records.
///
/// Lines are buffered by a background task and written when `batch_size` is reached,
/// on every `flush_interval` tick, and on explicit flush or shutdown.
pub struct LogManager {
    sender: Sender<LogCommand>,
}

impl LogManager {
    pub fn new(
        log_dir: impl AsRef<Path>,
        file_name: &str,
        buffer_size: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let log_file = Arc::new(rolling::hourly(log_dir, file_name));
        tokio::spawn(Self::background_log_writer(
            log_file,
            receiver,
            batch_size.max(1),
            flush_interval,
        ));
        Arc::new(Self { sender })
    }

    pub async fn log(&self, message: String) {
        if let Err(e) = self.sender.send(LogCommand::Line(message)).await {
            warn!(error = %e, "Failed to send log line");
        }
    }

    /// Serialises `record` as one JSON line.
    pub async fn log_record<T: Serialize>(&self, record: &T) {
        match serde_json::to_string(record) {
            Ok(line) => self.log(line).await,
            Err(e) => warn!(error = %e, "Failed to serialise log record"),
        }
    }

    /// Waits until everything logged so far is on disk.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(LogCommand::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Writes out pending lines and stops the background writer. Later lines are
    /// dropped.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(LogCommand::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    async fn background_log_writer(
        log_file: Arc<RollingFileAppender>,
        mut receiver: Receiver<LogCommand>,
        batch_size: usize,
        flush_interval: Duration,
    ) {
        let mut buffer = Vec::new();
        let mut interval = time::interval(flush_interval);

        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(LogCommand::Line(line)) => {
                        buffer.push(line);
                        if buffer.len() >= batch_size {
                            Self::write_logs_to_disk(log_file.clone(), &mut buffer).await;
                        }
                    }
                    Some(LogCommand::Flush(ack)) => {
                        Self::write_logs_to_disk(log_file.clone(), &mut buffer).await;
                        let _ = ack.send(());
                    }
                    Some(LogCommand::Shutdown(ack)) => {
                        Self::write_logs_to_disk(log_file.clone(), &mut buffer).await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        Self::write_logs_to_disk(log_file.clone(), &mut buffer).await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    Self::write_logs_to_disk(log_file.clone(), &mut buffer).await;
                }
            }
        }
    }

    async fn write_logs_to_disk(file: Arc<RollingFileAppender>, buffer: &mut Vec<String>) {
        if buffer.is_empty() {
            return;
        }
        let content = buffer.join("\n") + "\n";
        buffer.clear();

        let result = task::spawn_blocking(move || {
            let mut writer = file.make_writer();
            writer.write_all(content.as_bytes())?;
            writer.flush()
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to write logs to file"),
            Err(e) => warn!(error = %e, "Log writer task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn read_logs(dir: &Path, prefix: &str) -> Vec<Value> {
        let mut lines = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if name.starts_with(prefix) {
                let content = std::fs::read_to_string(&path).unwrap();
                lines.extend(content.lines().map(|l| serde_json::from_str::<Value>(l).unwrap()));
            }
        }
        lines
    }

    #[tokio::test]
    async fn flush_writes_buffered_lines() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LogManager::new(dir.path(), "audit.json", 16, 100, Duration::from_secs(60));

        manager.log_record(&serde_json::json!({"n": 1})).await;
        manager.log_record(&serde_json::json!({"n": 2})).await;
        manager.flush().await;

        let lines = read_logs(dir.path(), "audit.json");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["n"], 2);
    }

    #[tokio::test]
    async fn shutdown_drains_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LogManager::new(dir.path(), "audit.json", 16, 100, Duration::from_secs(60));

        manager.log("{\"n\":1}".to_string()).await;
        manager.shutdown().await;
        manager.log("{\"n\":2}".to_string()).await;
        manager.flush().await;

        assert_eq!(read_logs(dir.path(), "audit.json").len(), 1);
    }
}
