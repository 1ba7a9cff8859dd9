use axum::{
    body::Bytes,
    extract::{
        Multipart,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::upload::{
    RequestError,
    models::{UploadData, UploadedFile},
};

/// Read every file part of a multipart body, whatever form field it was
/// sent under. Parts without a file name are plain form values and are
/// skipped.
///
/// File contents are kept in memory while their running total stays within
/// `memory_budget` bytes; a part that would go past it is spooled to a
/// temporary file instead.
pub async fn read_uploaded_files(
    mut multipart: Multipart,
    memory_budget: usize,
) -> Result<Vec<UploadedFile>, RequestError> {
    let mut files = Vec::new();
    let mut ignored_fields = 0;
    let mut remaining = memory_budget;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("failed to read multipart field", e))?
    {
        let field_name = field.name().unwrap_or("unnamed").to_string();

        let Some(file_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            debug!("Ignoring non-file multipart field: {}", field_name);
            ignored_fields += 1;
            continue;
        };

        let content_type = field.content_type().map(str::to_string);
        debug!(
            "Received file {:?} in field {} with content type: {:?}",
            file_name, field_name, content_type
        );

        let (data, size) = read_file_data(&mut field, &mut remaining).await?;

        files.push(UploadedFile {
            field_name,
            file_name,
            content_type,
            size,
            data,
        });
    }

    if ignored_fields > 0 {
        debug!(
            "Ignored {} non-file fields in multipart request",
            ignored_fields
        );
    }

    Ok(files)
}

async fn read_file_data(
    field: &mut Field<'_>,
    remaining: &mut usize,
) -> Result<(UploadData, u64), RequestError> {
    let mut buffer = Vec::new();
    let mut spool: Option<(tokio::fs::File, TempPath)> = None;
    let mut size = 0u64;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error("failed to read file data", e))?
    {
        size += chunk.len() as u64;

        if let Some((file, _)) = spool.as_mut() {
            file.write_all(&chunk).await.map_err(RequestError::Spool)?;
        } else if buffer.len() + chunk.len() > *remaining {
            let (mut file, path) = create_spool().map_err(RequestError::Spool)?;
            debug!("Spooling upload part to {}", path.display());
            file.write_all(&buffer).await.map_err(RequestError::Spool)?;
            file.write_all(&chunk).await.map_err(RequestError::Spool)?;
            buffer = Vec::new();
            spool = Some((file, path));
        } else {
            buffer.extend_from_slice(&chunk);
        }
    }

    match spool {
        Some((mut file, path)) => {
            file.flush().await.map_err(RequestError::Spool)?;
            Ok((UploadData::Spooled(Arc::new(path)), size))
        }
        None => {
            *remaining -= buffer.len();
            Ok((UploadData::Memory(Bytes::from(buffer)), size))
        }
    }
}

fn create_spool() -> std::io::Result<(tokio::fs::File, TempPath)> {
    let (file, path) = NamedTempFile::new()?.into_parts();
    Ok((tokio::fs::File::from_std(file), path))
}

fn multipart_error(context: &str, err: MultipartError) -> RequestError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RequestError::BodyTooLarge(err.body_text())
    } else {
        RequestError::MultipartParse(format!("{}: {}", context, err))
    }
}
