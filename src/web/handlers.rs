// API handlers for the web server

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    response::Redirect,
};
use tracing::{debug, info, warn};

use super::{
    AppState,
    error::AppError,
    extract_request_data::read_uploaded_files,
    identity::MaybeIdentity,
    models::{UploadResponseEntry, response_entries},
};
use crate::upload::{aggregate::summarize, storage::TenantPath};

// --- POST /upload/ ---
// Stores every image of a multipart upload in all sizes and returns their
// manifest entries
pub async fn upload_images(
    State(state): State<AppState>,
    MaybeIdentity(identity): MaybeIdentity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<UploadResponseEntry>>, AppError> {
    let multipart = multipart.map_err(|e| {
        debug!("Rejected non-multipart upload: {}", e);
        AppError::BadRequest
    })?;

    let tenant = TenantPath::for_identity(identity.as_ref().map(|id| id.user_id.as_str()))?;
    info!("Upload request: tenant={:?}", tenant.as_deref());

    let outcomes = state
        .orchestrator
        .ingest(
            tenant,
            read_uploaded_files(multipart, state.settings.multipart_memory_bytes),
        )
        .await?;

    let report = summarize(outcomes);
    info!(
        "Upload finished: {} stored, {} failed",
        report.entries.len(),
        report.failures.len()
    );

    Ok(Json(response_entries(
        report,
        state.settings.report_failures,
    )))
}

// --- GET / ---
// Redirects to the configured landing page, if any
pub async fn root(State(state): State<AppState>) -> Result<Redirect, AppError> {
    match state.settings.redirect_url.as_deref() {
        Some(url) => Ok(Redirect::to(url)),
        None => Err(AppError::NotFound),
    }
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}

pub async fn method_not_allowed() -> AppError {
    warn!("Method not allowed on upload endpoint");
    AppError::MethodNotAllowed
}
