// Data carried through the ingestion pipeline.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;

use super::{error::ProcessingError, image_codec::flatten, size::SizeLabel};

/// One file part of a multipart upload. Lives for the duration of the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name of the form field the part was sent under.
    pub field_name: String,
    /// Client-supplied file name; never used for storage.
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub data: UploadData,
}

/// Where the bytes of an uploaded file are held until it is decoded.
#[derive(Debug, Clone)]
pub enum UploadData {
    Memory(Bytes),
    /// Spooled to a temporary file, removed when the last handle is dropped.
    Spooled(Arc<TempPath>),
}

impl UploadData {
    /// Get the full contents. Blocks on disk I/O for spooled uploads.
    pub fn load(&self) -> Result<Bytes, ProcessingError> {
        match self {
            UploadData::Memory(bytes) => Ok(bytes.clone()),
            UploadData::Spooled(path) => {
                let path: &Path = path;
                std::fs::read(path)
                    .map(Bytes::from)
                    .map_err(|source| ProcessingError::FilesystemFailure {
                        path: path.to_path_buf(),
                        source,
                    })
            }
        }
    }
}

/// Decoded pixels of one upload, already flattened onto an opaque backdrop
/// and shared read-only by its size renderers.
#[derive(Debug)]
pub struct DecodedImage {
    pub pixels: RgbImage,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        let pixels = flatten(&image);
        let (width, height) = pixels.dimensions();
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// A variant that has been written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedVariant {
    pub label: SizeLabel,
    /// Public path, e.g. `/upload/42/256/<id>.jpg`.
    pub path: String,
}

/// Result of a fully processed upload, returned to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Stored file name shared by every variant (`<id>.<ext>`).
    pub file: String,
    /// File name as supplied by the client.
    pub name: String,
    /// Path of the `original` variant.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub original_size: u64,
    /// Paths of the resized variants, keyed by size label.
    pub sizes: BTreeMap<SizeLabel, String>,
    pub created_at: DateTime<Utc>,
}

/// What happened to one dispatched file.
#[derive(Debug)]
pub struct FileOutcome {
    pub file_name: String,
    pub result: Result<ManifestEntry, ProcessingError>,
}

/// A file that could not be turned into a manifest entry.
#[derive(Debug)]
pub struct FailedFile {
    pub file_name: String,
    pub error: ProcessingError,
}

/// All outcomes of one request, split by success.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub entries: Vec<ManifestEntry>,
    pub failures: Vec<FailedFile>,
}

impl UploadReport {
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = FileOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome.result {
                Ok(entry) => report.entries.push(entry),
                Err(error) => report.failures.push(FailedFile {
                    file_name: outcome.file_name,
                    error,
                }),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ManifestEntry {
        let mut sizes = BTreeMap::new();
        sizes.insert(SizeLabel::Small, "/upload/256/x.jpg".to_string());
        sizes.insert(SizeLabel::ExtraLarge, "/upload/2048/x.jpg".to_string());
        ManifestEntry {
            file: "x.jpg".to_string(),
            name: name.to_string(),
            url: "/upload/original/x.jpg".to_string(),
            width: 10,
            height: 20,
            original_size: 1234,
            sizes,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_manifest_entry_json_shape() {
        let value = serde_json::to_value(entry("cat.png")).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "file",
            "name",
            "url",
            "width",
            "height",
            "originalSize",
            "sizes",
            "createdAt",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(value["sizes"]["256"], "/upload/256/x.jpg");
        assert_eq!(value["originalSize"], 1234);
    }

    #[test]
    fn test_decoded_image_is_flattened_once() {
        let mut rgba = image::RgbaImage::new(3, 2);
        rgba.put_pixel(0, 0, image::Rgba([250, 120, 60, 0]));
        rgba.put_pixel(2, 1, image::Rgba([250, 120, 60, 255]));

        let decoded = DecodedImage::new(DynamicImage::ImageRgba8(rgba));

        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(decoded.pixels.get_pixel(2, 1).0, [250, 120, 60]);
    }

    #[test]
    fn test_spooled_data_is_read_back_and_removed() {
        let mut spool = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut spool, b"spooled bytes").unwrap();
        let path = spool.into_temp_path();
        let location = path.to_path_buf();
        let data = UploadData::Spooled(Arc::new(path));

        assert_eq!(&data.load().unwrap()[..], b"spooled bytes");
        let copy = data.clone();
        drop(data);
        assert!(location.exists());
        drop(copy);
        assert!(!location.exists());
    }

    #[test]
    fn test_report_splits_outcomes() {
        let outcomes = vec![
            FileOutcome {
                file_name: "a.png".into(),
                result: Ok(entry("a.png")),
            },
            FileOutcome {
                file_name: "b.gif".into(),
                result: Err(ProcessingError::UnsupportedMediaType {
                    file_name: "b.gif".into(),
                    content_type: "image/gif".into(),
                }),
            },
        ];
        let report = UploadReport::from_outcomes(outcomes);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file_name, "b.gif");
    }
}
