// Read path: serves stored variants from the same tree uploads write to.
//
// Accepted paths are `/upload/<label>/<file>` (shared root) and
// `/upload/<tenant>/<label>/<file>`. Which callers may read a tenant's files
// is decided by the configured `ReadAccess` policy.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, Uri, header},
    response::Response,
};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::debug;

use super::{
    AppState,
    error::AppError,
    identity::{Identity, MaybeIdentity},
};
use crate::upload::{
    size::SizeLabel,
    storage::{PUBLIC_PREFIX, is_plain_segment, is_tenant_segment},
};

pub const CACHE_CONTROL_VALUE: &str = "private, max-age=31536000, immutable";

/// Who may read files stored under a tenant directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReadAccess {
    /// Every stored file is readable by anyone.
    #[default]
    Public,
    /// Tenant files are readable by their owner and by admins only. Files in
    /// the shared root stay public.
    Owner,
}

/// A validated request for one stored variant.
#[derive(Debug, PartialEq, Eq)]
pub struct StoredFileRequest<'a> {
    pub tenant: Option<&'a str>,
    pub label: SizeLabel,
    pub file: &'a str,
}

impl<'a> StoredFileRequest<'a> {
    /// Parse the part of the path after `/upload/`.
    pub fn parse(tail: &'a str) -> Option<Self> {
        let segments: Vec<&str> = tail.split('/').collect();
        if !segments.iter().all(|s| is_plain_segment(s)) {
            return None;
        }

        let (tenant, label, file) = match segments.as_slice() {
            [label, file] => (None, *label, *file),
            [tenant, label, file] if is_tenant_segment(tenant) => (Some(*tenant), *label, *file),
            _ => return None,
        };

        Some(Self {
            tenant,
            label: SizeLabel::from_segment(label)?,
            file,
        })
    }

    pub fn is_readable_by(&self, policy: ReadAccess, identity: Option<&Identity>) -> bool {
        match (policy, self.tenant) {
            (ReadAccess::Public, _) | (ReadAccess::Owner, None) => true,
            (ReadAccess::Owner, Some(tenant)) => {
                identity.is_some_and(|id| id.is_admin() || id.user_id == tenant)
            }
        }
    }

    fn storage_uri(&self) -> Result<Uri, AppError> {
        let path = match self.tenant {
            Some(tenant) => format!("/{}/{}/{}", tenant, self.label, self.file),
            None => format!("/{}/{}", self.label, self.file),
        };
        path.parse().map_err(|_| AppError::NotFound)
    }
}

// --- GET /upload/{*path} ---
// Serves one stored variant with long-lived immutable caching
pub async fn serve_stored(
    State(state): State<AppState>,
    MaybeIdentity(identity): MaybeIdentity,
    mut request: Request,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    let tail = path
        .strip_prefix(PUBLIC_PREFIX)
        .and_then(|p| p.strip_prefix('/'))
        .ok_or(AppError::NotFound)?;
    let stored = StoredFileRequest::parse(tail).ok_or(AppError::NotFound)?;

    if !stored.is_readable_by(state.settings.read_access, identity.as_ref()) {
        debug!(
            "Denied read of {} for {:?}",
            path,
            identity.as_ref().map(|id| &id.user_id)
        );
        return Err(AppError::Forbidden);
    }

    *request.uri_mut() = stored.storage_uri()?;

    let response = ServeDir::new(state.orchestrator.pipeline().layout.root())
        .oneshot(request)
        .await
        .map_err(|e| AppError::InternalServerError(format!("serve {}: {}", path, e)))?;

    match response.status() {
        StatusCode::NOT_FOUND => Err(AppError::NotFound),
        status => {
            let mut response = response.map(Body::new);
            if status.is_success() || status == StatusCode::NOT_MODIFIED {
                response.headers_mut().insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(CACHE_CONTROL_VALUE),
                );
            }
            Ok(response)
        }
    }
}
