// Per-file processor: decode one upload, render every size in parallel and
// fold the results into a single manifest entry.
//
// Received -> Decoding -> {Rejected | Decoded} -> RenderingAllSizes
//          -> {FileFailed | Manifested}

use chrono::Utc;
use rand::{RngCore, rngs::OsRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    error::ProcessingError,
    image_codec::{OutputFormat, SourceFormat, decode_upload},
    models::{DecodedImage, ManifestEntry, RenderedVariant, UploadedFile},
    pool::{DecodeSlots, RenderPool},
    render::{RenderTarget, render_variant},
    size::SizeLabel,
    storage::{StorageLayout, TenantPath},
};

/// Shared, immutable settings of the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub layout: StorageLayout,
    pub pool: RenderPool,
    pub decode_slots: DecodeSlots,
    pub format: OutputFormat,
}

impl Pipeline {
    /// As many files may hold decoded pixels as the pool has slots.
    pub fn new(layout: StorageLayout, pool: RenderPool, format: OutputFormat) -> Self {
        let decode_slots = DecodeSlots::new(pool.capacity());
        Self {
            layout,
            pool,
            decode_slots,
            format,
        }
    }

    pub fn with_decoded_limit(mut self, limit: usize) -> Self {
        self.decode_slots = DecodeSlots::new(limit);
        self
    }
}

/// Draw a fresh random (version 4) identifier from the OS RNG.
///
/// Every variant of an upload is stored under this identifier, so concurrent
/// uploads never share a destination path and no locking is needed.
pub fn generate_stored_id() -> Result<Uuid, ProcessingError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ProcessingError::IdentifierGenerationFailure(e.to_string()))?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

pub async fn process_file(
    pipeline: Arc<Pipeline>,
    tenant: TenantPath,
    file: UploadedFile,
) -> Result<ManifestEntry, ProcessingError> {
    let source_format =
        SourceFormat::from_content_type(file.content_type.as_deref(), &file.file_name)?;

    // Held until every size has been rendered and the pixels are dropped
    let _slot = pipeline.decode_slots.acquire().await?;

    let data = file.data.clone();
    let file_name = file.file_name.clone();
    let image = pipeline
        .pool
        .run(move || {
            let bytes = data.load()?;
            decode_upload(&bytes, source_format, &file_name).map(DecodedImage::new)
        })
        .await??;
    let image = Arc::new(image);

    debug!(
        "Decoded {}: {}x{} (aspect ratio {:.3}, {}/{} decoded images held)",
        file.file_name,
        image.width,
        image.height,
        image.aspect_ratio(),
        pipeline.decode_slots.in_use(),
        pipeline.decode_slots.capacity()
    );

    let stored_file_name = format!("{}.{}", generate_stored_id()?, pipeline.format.extension());

    let mut renders = JoinSet::new();
    for label in SizeLabel::ALL {
        let target = RenderTarget {
            label,
            directory: pipeline.layout.label_dir(&tenant, label),
            file_name: stored_file_name.clone(),
            format: pipeline.format,
        };
        let public_path = pipeline
            .layout
            .public_path(&tenant, label, &stored_file_name);
        let image = image.clone();
        let pool = pipeline.pool.clone();

        renders.spawn(async move {
            pool.run(move || render_variant(&image, &target))
                .await
                .and_then(|rendered| rendered)
                .map(|_| RenderedVariant {
                    label,
                    path: public_path,
                })
        });
    }

    // Wait for every size, even after one has failed
    let mut original_path = None;
    let mut sizes = BTreeMap::new();
    let mut first_error = None;
    while let Some(joined) = renders.join_next().await {
        let rendered = joined
            .map_err(|e| ProcessingError::TaskFailure(e.to_string()))
            .and_then(|rendered| rendered);

        match rendered {
            Ok(RenderedVariant {
                label: SizeLabel::Original,
                path,
            }) => original_path = Some(path),
            Ok(RenderedVariant { label, path }) => {
                sizes.insert(label, path);
            }
            Err(err) => {
                warn!("Rendering a variant of {} failed: {}", file.file_name, err);
                first_error.get_or_insert(err);
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    let url = original_path.ok_or_else(|| {
        ProcessingError::TaskFailure("original variant was not rendered".to_string())
    })?;

    info!(
        "Stored {} as {} ({} sizes)",
        file.file_name,
        stored_file_name,
        sizes.len() + 1
    );

    Ok(ManifestEntry {
        file: stored_file_name,
        name: file.file_name,
        url,
        width: image.width,
        height: image.height,
        original_size: file.size,
        sizes,
        created_at: Utc::now(),
    })
}
