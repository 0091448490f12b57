use std::path::Path;

use anyhow::Context;
use convert_pdf::PdfWriter;

/// Check if a file is an image we can decode, based on extension.
pub fn accepts(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| is_image_ext(&e.to_lowercase()))
        .unwrap_or(false)
}

pub fn is_image_ext(ext: &str) -> bool {
    matches!(ext, "jpg" | "jpeg" | "png")
}

/// Put a JPEG or PNG on a single PDF page the size of the image.
///
/// The image is flattened to 8-bit RGB first; any alpha channel is dropped.
pub fn img_to_pdf(input: &Path, output: &Path) -> anyhow::Result<()> {
    let img = image::ImageReader::open(input)
        .with_context(|| format!("opening {}", input.display()))?
        .with_guessed_format()?
        .decode()
        .context("decoding image")?;

    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    tracing::debug!("img_to_pdf: {width}x{height} from {}", input.display());

    let mut writer = PdfWriter::new();
    writer.add_image_page(width, height, rgb.as_raw())?;
    writer.save(output)
}
