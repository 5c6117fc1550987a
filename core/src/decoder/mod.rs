//! Image decoding for uploads
//!
//! Turns a path or byte buffer holding either a raster image or a DICOM
//! object into a [`CanonicalImage`]. DICOM objects additionally yield a
//! [`DicomMetadata`] record.

mod dicom;
mod hash;
mod metadata;
mod standard;
pub mod tags;

#[cfg(test)]
pub(crate) mod fixtures;

pub use dicom::{
    decode_dicom, is_dicom, is_dicom_bytes, read_dicom_bytes, read_dicom_file, validate_dicom,
    SUPPORTED_MODALITIES,
};
pub use hash::{hash_bytes, hash_file};
pub use metadata::{DicomMetadata, ANONYMOUS_NAME, ANON_ID_PREFIX};
pub use standard::{decode_image_bytes, decode_image_file, image_dimensions};

use crate::error::Result;
use crate::types::CanonicalImage;
use log::debug;
use std::path::Path;

/// Decodes a file of either format into a canonical image
///
/// # Errors
///
/// Returns a decode, DICOM or image error when the content cannot be read
pub fn decode(path: &Path) -> Result<CanonicalImage> {
    decode_with_metadata(path).map(|(image, _)| image)
}

/// Decodes a file and, for DICOM input, extracts its raw metadata
///
/// The metadata is not anonymized.
pub fn decode_with_metadata(path: &Path) -> Result<(CanonicalImage, Option<DicomMetadata>)> {
    if is_dicom(path) {
        debug!("Decoding {} as DICOM", path.display());
        let obj = read_dicom_file(path)?;
        let metadata = DicomMetadata::extract(&obj);
        Ok((decode_dicom(&obj)?, Some(metadata)))
    } else {
        debug!("Decoding {} as raster image", path.display());
        Ok((decode_image_file(path)?, None))
    }
}

/// Decodes an in-memory buffer of either format
pub fn decode_bytes(bytes: &[u8]) -> Result<CanonicalImage> {
    if is_dicom_bytes(bytes) {
        decode_dicom(&read_dicom_bytes(bytes)?)
    } else {
        decode_image_bytes(bytes)
    }
}

/// Renders a DICOM file's first frame as PNG
pub fn dicom_to_png(path: &Path) -> Result<Vec<u8>> {
    let obj = read_dicom_file(path)?;
    decode_dicom(&obj)?.to_png_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceFormat;
    use fixtures::{write_png, GrayDicom};
    use tempfile::TempDir;

    #[test]
    fn test_decode_dispatches_on_content() {
        let temp_dir = TempDir::new().unwrap();
        let dcm = temp_dir.path().join("scan.png");
        GrayDicom::new(4, 4, (0..16).collect()).write(&dcm);
        let png = temp_dir.path().join("photo.dcm");
        write_png(&png, 8, 8);

        let (image, metadata) = decode_with_metadata(&dcm).unwrap();
        assert_eq!(image.source(), SourceFormat::Dicom);
        assert_eq!(metadata.unwrap().patient_id, "PAT-001");

        let (image, metadata) = decode_with_metadata(&png).unwrap();
        assert_eq!(image.source(), SourceFormat::StandardImage);
        assert!(metadata.is_none());
    }

    #[test]
    fn test_decode_bytes_matches_decode() {
        let temp_dir = TempDir::new().unwrap();
        let dcm = temp_dir.path().join("scan.dcm");
        GrayDicom::new(4, 4, (0..16).map(|v| v * 100).collect()).write(&dcm);
        let bytes = std::fs::read(&dcm).unwrap();
        assert_eq!(decode_bytes(&bytes).unwrap(), decode(&dcm).unwrap());
    }

    #[test]
    fn test_dicom_to_png() {
        let temp_dir = TempDir::new().unwrap();
        let dcm = temp_dir.path().join("scan.dcm");
        GrayDicom::new(3, 5, vec![7; 15]).write(&dcm);
        let png = dicom_to_png(&dcm).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 3));
    }
}
