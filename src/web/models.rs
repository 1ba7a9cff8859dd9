// API-specific response models.

use serde::Serialize;

use crate::upload::models::{ManifestEntry, UploadReport};

/// One element of the upload response array.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadResponseEntry {
    Stored(ManifestEntry),
    Failed(FailedEntry),
}

/// A file that could not be stored, reported only when failure reporting is
/// enabled.
#[derive(Debug, Serialize)]
pub struct FailedEntry {
    pub name: String,
    pub error: FailureDetail,
}

#[derive(Debug, Serialize)]
pub struct FailureDetail {
    pub kind: &'static str,
    pub message: String,
}

/// Build the response array. Stored entries always come first, in
/// submission order; failures follow only when `include_failures` is set.
pub fn response_entries(report: UploadReport, include_failures: bool) -> Vec<UploadResponseEntry> {
    let mut entries: Vec<UploadResponseEntry> = report
        .entries
        .into_iter()
        .map(UploadResponseEntry::Stored)
        .collect();

    if include_failures {
        entries.extend(report.failures.into_iter().map(|failure| {
            UploadResponseEntry::Failed(FailedEntry {
                name: failure.file_name,
                error: FailureDetail {
                    kind: failure.error.kind(),
                    message: failure.error.to_string(),
                },
            })
        }));
    }

    entries
}
