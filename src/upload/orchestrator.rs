// Upload orchestrator: prepares storage for a request, then fans the
// request's files out to per-file processors and joins their outcomes.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    aggregate::outcome_channel,
    error::RequestError,
    models::{FileOutcome, UploadedFile},
    process::{Pipeline, process_file},
    storage::TenantPath,
};

#[derive(Debug, Clone)]
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
}

impl Orchestrator {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run one upload request.
    ///
    /// Directories are prepared before `files` is polled, so a storage
    /// failure aborts the request without reading the body. Either request
    /// level failure means no file is processed.
    pub async fn ingest<F>(
        &self,
        tenant: TenantPath,
        files: F,
    ) -> Result<Vec<FileOutcome>, RequestError>
    where
        F: Future<Output = Result<Vec<UploadedFile>, RequestError>>,
    {
        self.pipeline.layout.prepare(&tenant).await?;
        let files = files.await?;
        Ok(self.dispatch(tenant, files).await)
    }

    /// Process every file concurrently and wait for all of them.
    ///
    /// The returned outcomes are in the same order as `files`.
    pub async fn dispatch(&self, tenant: TenantPath, files: Vec<UploadedFile>) -> Vec<FileOutcome> {
        let file_names = files.iter().map(|f| f.file_name.clone()).collect();
        let (sender, aggregator) = outcome_channel(file_names);

        info!(
            "Dispatching {} file(s) for tenant {:?}",
            aggregator.expected(),
            tenant.as_deref()
        );

        for (slot, file) in files.into_iter().enumerate() {
            let sender = sender.clone();
            let pipeline = self.pipeline.clone();
            let tenant = tenant.clone();

            tokio::spawn(async move {
                let file_name = file.file_name.clone();
                debug!("Processing {} (field {}, {} bytes)", file_name, file.field_name, file.size);
                let result = process_file(pipeline, tenant, file).await;
                sender.send(slot, FileOutcome { file_name, result }).await;
            });
        }
        drop(sender);

        let outcomes = aggregator.join().await;
        debug!(
            "Dispatch finished; at most {} decoded image(s) were held at once",
            self.pipeline.decode_slots.peak()
        );
        outcomes
    }
}
