// On-disk layout of stored variants:
//
//   <root>/[<tenant>/]<label>/<stored-id>.<ext>
//
// and the public paths that point at them (`/upload/...`).

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{error::RequestError, size::SizeLabel};

/// Prefix of every public path handed back to clients.
pub const PUBLIC_PREFIX: &str = "/upload";

/// Per-identity storage subdirectory; `None` selects the shared root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantPath(Option<String>);

impl TenantPath {
    pub fn shared() -> Self {
        Self(None)
    }

    /// Build the tenant path for an optional caller identity.
    ///
    /// The tenant directory sits next to the shared root's label directories,
    /// so an identity must be a plain segment that is not itself a size label.
    pub fn for_identity(identity: Option<&str>) -> Result<Self, RequestError> {
        match identity {
            None | Some("") => Ok(Self::shared()),
            Some(id) if is_tenant_segment(id) => Ok(Self(Some(id.to_string()))),
            Some(id) => {
                warn!("Identity {:?} is not usable as a directory name", id);
                Err(RequestError::UnusableIdentity(id.to_string()))
            }
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// True for a non-empty segment made only of ASCII letters, digits, `-`, `_`
/// and `.`, other than `.` and `..`.
pub fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// A plain segment that does not collide with a label directory of the
/// shared root.
pub fn is_tenant_segment(segment: &str) -> bool {
    is_plain_segment(segment) && SizeLabel::from_segment(segment).is_none()
}

/// Where variants of one request are written and how they are addressed.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn label_dir(&self, tenant: &TenantPath, label: SizeLabel) -> PathBuf {
        let mut dir = self.root.clone();
        if let Some(tenant) = tenant.as_deref() {
            dir.push(tenant);
        }
        dir.push(label.as_str());
        dir
    }

    pub fn public_path(&self, tenant: &TenantPath, label: SizeLabel, file_name: &str) -> String {
        match tenant.as_deref() {
            Some(tenant) => format!("{}/{}/{}/{}", PUBLIC_PREFIX, tenant, label, file_name),
            None => format!("{}/{}/{}", PUBLIC_PREFIX, label, file_name),
        }
    }

    /// Ensure one directory per size label exists for `tenant`.
    ///
    /// Safe to call concurrently: a directory that already exists (or that a
    /// concurrent request created first) is not an error.
    pub async fn prepare(&self, tenant: &TenantPath) -> Result<(), RequestError> {
        for label in SizeLabel::ALL {
            let dir = self.label_dir(tenant, label);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| RequestError::DirectoryPreparation {
                    path: dir.clone(),
                    source,
                })?;
            debug!("Storage directory ready: {}", dir.display());
        }
        Ok(())
    }
}
