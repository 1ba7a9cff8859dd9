use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, ImageError, ImageFormat, RgbImage,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilter, PngEncoder},
    },
};
use std::io::Write;
use std::path::Path;
use tracing::debug;

use super::error::ProcessingError;

/// Codecs accepted for uploads, resolved from the part's declared MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
}

impl SourceFormat {
    pub fn from_content_type(
        content_type: Option<&str>,
        file_name: &str,
    ) -> Result<Self, ProcessingError> {
        let essence = content_type
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_ascii_lowercase());

        match essence.as_deref() {
            Some("image/png") => Ok(SourceFormat::Png),
            Some("image/jpeg") => Ok(SourceFormat::Jpeg),
            Some("image/heic") => Err(ProcessingError::HeicNotSupported {
                file_name: file_name.to_string(),
            }),
            _ => Err(ProcessingError::UnsupportedMediaType {
                file_name: file_name.to_string(),
                content_type: content_type.unwrap_or("none").to_string(),
            }),
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            SourceFormat::Png => ImageFormat::Png,
            SourceFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Codec used for every stored variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputCodec {
    Jpeg,
    Png,
}

/// Fully configured output encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl OutputFormat {
    pub const MAX_JPEG_QUALITY: u8 = 100;
    pub const DEFAULT_JPEG_QUALITY: u8 = 75;

    pub fn new(codec: OutputCodec, jpeg_quality: u8) -> Self {
        match codec {
            OutputCodec::Jpeg => OutputFormat::Jpeg {
                quality: jpeg_quality.clamp(1, Self::MAX_JPEG_QUALITY),
            },
            OutputCodec::Png => OutputFormat::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// Encode `pixels` into `writer`. With `max_quality` JPEG ignores the
    /// configured quality and PNG uses its best compression.
    pub fn encode<W: Write>(
        self,
        writer: W,
        pixels: &RgbImage,
        max_quality: bool,
    ) -> Result<(), ImageError> {
        let (width, height) = pixels.dimensions();
        match self {
            OutputFormat::Jpeg { quality } => {
                let quality = if max_quality {
                    Self::MAX_JPEG_QUALITY
                } else {
                    quality
                };
                debug!("Encoding {}x{} variant as JPEG (q={}).", width, height, quality);
                JpegEncoder::new_with_quality(writer, quality).write_image(
                    pixels.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )
            }
            OutputFormat::Png => {
                debug!("Encoding {}x{} variant as PNG.", width, height);
                let encoder = if max_quality {
                    PngEncoder::new_with_quality(writer, CompressionType::Best, PngFilter::Adaptive)
                } else {
                    PngEncoder::new(writer)
                };
                encoder.write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgb8)
            }
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg {
            quality: Self::DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Decode the uploaded bytes with the codec named by the declared MIME type.
pub fn decode_upload(
    data: &[u8],
    format: SourceFormat,
    file_name: &str,
) -> Result<DynamicImage, ProcessingError> {
    image::load_from_memory_with_format(data, format.image_format()).map_err(|e| {
        ProcessingError::DecodeFailure {
            file_name: file_name.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Composite `image` over an opaque black backdrop and drop the alpha channel.
pub fn flatten(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        let over = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        dst.0 = [over(r), over(g), over(b)];
    }
    out
}

/// Map an encoder error onto the per-file taxonomy; I/O errors raised while
/// the encoder writes count as filesystem failures.
pub fn encode_error(path: &Path, err: ImageError) -> ProcessingError {
    match err {
        ImageError::IoError(source) => ProcessingError::FilesystemFailure {
            path: path.to_path_buf(),
            source,
        },
        other => ProcessingError::EncodeFailure {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}
