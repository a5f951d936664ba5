use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use weft_core::event::EventBus;
use weft_core::types::{RunEvent, RunId};

/// JSONL run journal.
///
/// Subscribes to the EventBus and appends every run event as one JSON
/// object per line. Only events of its own run are kept, so several runs
/// can share one bus. Streamed agent deltas are skipped; the completed
/// output arrives as a `node_output` line anyway.
pub struct RunJournal {
    log_dir: PathBuf,
}

/// A single line of the journal.
#[derive(Serialize)]
struct JournalLine<'a> {
    timestamp: String,
    run_id: &'a str,
    event: &'a RunEvent,
}

impl RunJournal {
    /// Journals are written to `{log_dir}/{run_id}/{timestamp}.jsonl`.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        self.log_dir
            .join(&run_id.0)
            .join(format!("{}.jsonl", timestamp))
    }

    /// Run the journal as a background task.
    ///
    /// Subscribe before starting the run so no early event is missed; the
    /// task stops at this run's `RunFinished`, on cancellation, or when the
    /// bus closes.
    pub async fn run(
        self,
        mut rx: tokio::sync::broadcast::Receiver<RunEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let log_path = self.path_for(&run_id);
        let mut writer = match open(&log_path).await {
            Some(writer) => writer,
            None => return None,
        };

        info!(path = %log_path.display(), "Run journal started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Run journal cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.run_id() != Some(&run_id)
                                || matches!(event, RunEvent::AgentDelta { .. })
                            {
                                continue;
                            }
                            if let Some(line) = to_line(&run_id, &event) {
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write journal line");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush journal");
                                }
                            }
                            if matches!(event, RunEvent::RunFinished { .. }) {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "Run journal lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, run journal stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "Run journal finished");
        Some(log_path)
    }

    /// Subscribe to `event_bus` and spawn the journal task.
    pub fn spawn(
        self,
        event_bus: &Arc<EventBus>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<Option<PathBuf>> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, run_id, cancel))
    }
}

async fn open(path: &Path) -> Option<tokio::io::BufWriter<tokio::fs::File>> {
    if let Some(dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!(error = %e, "Failed to create journal directory");
            return None;
        }
    }

    match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
    {
        Ok(file) => Some(tokio::io::BufWriter::new(file)),
        Err(e) => {
            error!(error = %e, path = %path.display(), "Failed to open journal file");
            None
        }
    }
}

fn to_line(run_id: &RunId, event: &RunEvent) -> Option<String> {
    let line = JournalLine {
        timestamp: Utc::now().to_rfc3339(),
        run_id: &run_id.0,
        event,
    };
    serde_json::to_string(&line).ok().map(|json| format!("{}\n", json))
}
