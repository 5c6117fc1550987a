use crate::error::Result;
use crate::types::{CanonicalImage, SourceFormat};
use std::path::Path;

/// Decodes a PNG/JPEG/other raster file
///
/// The format is sniffed from content, not the extension.
pub fn decode_image_file(path: &Path) -> Result<CanonicalImage> {
    let image = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    CanonicalImage::from_dynamic(image, SourceFormat::StandardImage)
}

/// Decodes a raster image held in memory
pub fn decode_image_bytes(bytes: &[u8]) -> Result<CanonicalImage> {
    let image = image::load_from_memory(bytes)?;
    CanonicalImage::from_dynamic(image, SourceFormat::StandardImage)
}

/// Reads only the header to obtain (width, height)
pub fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    Ok(image::ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fixtures::write_png;
    use tempfile::TempDir;

    #[test]
    fn test_decode_png_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let png = temp_dir.path().join("fundus.png");
        write_png(&png, 12, 9);
        let renamed = temp_dir.path().join("upload");
        std::fs::rename(&png, &renamed).unwrap();

        let img = decode_image_file(&renamed).unwrap();
        assert_eq!((img.width(), img.height(), img.channels()), (12, 9, 3));
        assert_eq!(img.source(), SourceFormat::StandardImage);
        assert_eq!(image_dimensions(&renamed).unwrap(), (12, 9));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_image_bytes(b"definitely not an image").is_err());
    }
}
