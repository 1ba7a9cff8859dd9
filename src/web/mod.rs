// Web server module
// Handles the HTTP API: uploads, the read path for stored variants and the
// identity middleware in front of both.

mod app;
mod error;
mod extract_request_data;
mod handlers;
mod identity;
mod listeners;
mod models;
mod serve;

pub use app::create_app;
pub use identity::IdentityVerifier;
pub use listeners::create_listener;
pub use serve::ReadAccess;

use crate::upload::Orchestrator;
use axum::http::HeaderValue;
use std::sync::Arc;

// Hard cap on a whole upload request body
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 << 20; // 256 MiB
// File parts past this many bytes per request are spooled to disk
pub const DEFAULT_MULTIPART_MEMORY_BYTES: usize = 32 << 20; // 32 MiB

/// Request-independent settings of the HTTP layer.
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub redirect_url: Option<String>,
    pub read_access: ReadAccess,
    pub report_failures: bool,
    pub max_upload_bytes: usize,
    pub multipart_memory_bytes: usize,
    pub allowed_origins: Vec<HeaderValue>,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            redirect_url: None,
            read_access: ReadAccess::default(),
            report_failures: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            multipart_memory_bytes: DEFAULT_MULTIPART_MEMORY_BYTES,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub settings: Arc<WebSettings>,
    /// `None` when no token secret is configured: every caller is anonymous.
    pub identity: Option<Arc<IdentityVerifier>>,
}
