// Per-size renderer: turns one decoded image into one stored variant.

use image::imageops::FilterType;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{
    error::ProcessingError,
    image_codec::{OutputFormat, encode_error},
    models::DecodedImage,
    size::{ResizePlan, SizeLabel, plan_for},
};

/// Everything one renderer invocation needs besides the pixels.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub label: SizeLabel,
    /// Directory the variant is written into (`<root>/[<tenant>/]<label>`).
    pub directory: PathBuf,
    /// Stored file name, identical for every size of one upload.
    pub file_name: String,
    pub format: OutputFormat,
}

impl RenderTarget {
    pub fn destination(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Render `image` according to `target.label` and write it to disk.
///
/// Returns the dimensions of the written variant. The file is written in
/// place: a failure part-way through can leave a truncated file behind.
pub fn render_variant(
    image: &DecodedImage,
    target: &RenderTarget,
) -> Result<(u32, u32), ProcessingError> {
    let plan = plan_for(target.label, image.width, image.height);
    let destination = target.destination();

    let (pixels, max_quality) = match plan {
        ResizePlan::Unscaled => (Cow::Borrowed(&image.pixels), true),
        ResizePlan::Scaled { width, height } => (
            Cow::Owned(image::imageops::resize(
                &image.pixels,
                width,
                height,
                FilterType::Triangle,
            )),
            false,
        ),
    };

    debug!(
        "Rendering {} variant: {}x{} -> {}x{} ({:?})",
        target.label,
        image.width,
        image.height,
        pixels.width(),
        pixels.height(),
        plan
    );

    write_variant(&destination, |writer| {
        target
            .format
            .encode(writer, &pixels, max_quality)
            .map_err(|e| encode_error(&destination, e))
    })?;

    Ok(pixels.dimensions())
}

fn write_variant<F>(destination: &Path, encode: F) -> Result<(), ProcessingError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), ProcessingError>,
{
    let filesystem_failure = |source| ProcessingError::FilesystemFailure {
        path: destination.to_path_buf(),
        source,
    };

    let file = File::create(destination).map_err(filesystem_failure)?;
    let mut writer = BufWriter::new(file);
    encode(&mut writer)?;
    writer.flush().map_err(filesystem_failure)?;
    Ok(())
}
