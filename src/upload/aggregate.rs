// Result aggregation: a count-based join over per-file outcomes.
//
// Workers report through a channel in whatever order they finish. Each
// report carries the slot it was dispatched in, and the aggregator buffers
// per slot so the joined list follows submission order.

use tokio::sync::mpsc;
use tracing::{error, warn};

use super::{
    error::ProcessingError,
    models::{FileOutcome, UploadReport},
};

/// Handle given to each file worker to report its single outcome.
#[derive(Debug, Clone)]
pub struct OutcomeSender {
    tx: mpsc::Sender<(usize, FileOutcome)>,
}

impl OutcomeSender {
    pub async fn send(&self, slot: usize, outcome: FileOutcome) {
        if self.tx.send((slot, outcome)).await.is_err() {
            error!("Aggregator dropped before outcome for slot {} arrived", slot);
        }
    }
}

#[derive(Debug)]
pub struct Aggregator {
    file_names: Vec<String>,
    rx: mpsc::Receiver<(usize, FileOutcome)>,
}

/// Create an aggregator that waits for exactly one outcome per entry in
/// `file_names`.
pub fn outcome_channel(file_names: Vec<String>) -> (OutcomeSender, Aggregator) {
    let (tx, rx) = mpsc::channel(file_names.len().max(1));
    (OutcomeSender { tx }, Aggregator { file_names, rx })
}

impl Aggregator {
    pub fn expected(&self) -> usize {
        self.file_names.len()
    }

    /// Block until every dispatched file has reported.
    ///
    /// A worker that dies without reporting (all senders dropped) is recorded
    /// as a `TaskFailure` for its slot instead of hanging the join.
    pub async fn join(mut self) -> Vec<FileOutcome> {
        let expected = self.expected();
        let mut slots: Vec<Option<FileOutcome>> = (0..expected).map(|_| None).collect();
        let mut received = 0;

        while received < expected {
            let Some((slot, outcome)) = self.rx.recv().await else {
                break;
            };
            match slots.get_mut(slot) {
                Some(entry) if entry.is_none() => {
                    *entry = Some(outcome);
                    received += 1;
                }
                Some(_) => warn!("Duplicate outcome for slot {} ignored", slot),
                None => warn!("Outcome for unknown slot {} ignored", slot),
            }
        }

        slots
            .into_iter()
            .zip(self.file_names)
            .map(|(outcome, file_name)| {
                outcome.unwrap_or_else(|| FileOutcome {
                    result: Err(ProcessingError::TaskFailure(format!(
                        "no outcome reported for {}",
                        file_name
                    ))),
                    file_name,
                })
            })
            .collect()
    }
}

/// Split joined outcomes and log every failure.
pub fn summarize(outcomes: Vec<FileOutcome>) -> UploadReport {
    let report = UploadReport::from_outcomes(outcomes);
    for failure in &report.failures {
        warn!(
            file = %failure.file_name,
            kind = failure.error.kind(),
            "Upload failed: {}",
            failure.error
        );
    }
    report
}
