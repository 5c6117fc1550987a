use super::tags::{
    self, get_string_or, get_string_value, get_u16_value, BITS_ALLOCATED, BITS_STORED, MODALITY,
    PHOTOMETRIC_INTERPRETATION, PIXEL_DATA, PIXEL_REPRESENTATION, PLANAR_CONFIGURATION,
};
use crate::error::{Result, RetinaError};
use crate::types::{CanonicalImage, SourceFormat};
use dicom_core::value::Value;
use dicom_object::file::ReadPreamble;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use dicom_pixeldata::PixelDecoder;
use log::debug;
use ndarray::{Array3, Axis};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

/// Byte offset of the "DICM" magic marker (after the 128-byte preamble)
const MAGIC_OFFSET: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Modalities accepted by [`validate_dicom`]
pub const SUPPORTED_MODALITIES: [&str; 10] =
    ["OCT", "OP", "OPT", "CF", "CR", "DX", "MG", "US", "CT", "MR"];

/// Checks a byte buffer for a DICOM header
///
/// Looks for the 4-byte magic at offset 128 first, then falls back to a
/// header-only parse of a stream that starts directly at the magic.
pub fn is_dicom_bytes(bytes: &[u8]) -> bool {
    if has_magic(bytes) {
        return true;
    }
    OpenFileOptions::new()
        .read_until(PIXEL_DATA)
        .read_preamble(ReadPreamble::Never)
        .from_reader(Cursor::new(bytes))
        .is_ok()
}

/// Checks if a file has a DICOM header, regardless of its extension
///
/// Only the first 132 bytes are read for the magic check; files without
/// a preamble get a header-only parse.
pub fn is_dicom(path: &Path) -> bool {
    let mut buffer = [0u8; MAGIC_OFFSET + 4];
    let has_header = File::open(path)
        .and_then(|mut f| f.read_exact(&mut buffer))
        .map(|_| has_magic(&buffer))
        .unwrap_or(false);
    if has_header {
        return true;
    }
    OpenFileOptions::new()
        .read_until(PIXEL_DATA)
        .open_file(path)
        .is_ok()
}

fn has_magic(bytes: &[u8]) -> bool {
    bytes.len() >= MAGIC_OFFSET + 4 && &bytes[MAGIC_OFFSET..MAGIC_OFFSET + 4] == MAGIC
}

/// Reads a complete DICOM file including pixel data
pub fn read_dicom_file(path: &Path) -> Result<DefaultDicomObject> {
    Ok(dicom_object::open_file(path)?)
}

/// Reads a complete DICOM object from an in-memory buffer
///
/// The buffer may carry the 128-byte preamble or start at the magic.
pub fn read_dicom_bytes(bytes: &[u8]) -> Result<DefaultDicomObject> {
    let body = if has_magic(bytes) {
        &bytes[MAGIC_OFFSET..]
    } else {
        bytes
    };
    Ok(OpenFileOptions::new()
        .read_preamble(ReadPreamble::Never)
        .from_reader(Cursor::new(body))?)
}

/// Checks that a file is a DICOM object this service can process
///
/// Returns `(valid, message)`; never fails.
pub fn validate_dicom(path: &Path) -> (bool, String) {
    let obj = match read_dicom_file(path) {
        Ok(obj) => obj,
        Err(e) => return (false, format!("Invalid DICOM file: {}", e)),
    };
    if get_string_value(&obj, tags::SOP_CLASS_UID).is_none() {
        debug!(
            "{} has no {}",
            path.display(),
            tags::tag_name(tags::SOP_CLASS_UID).unwrap_or("SOP class")
        );
        return (false, "Missing required DICOM elements".to_string());
    }
    let modality = get_string_or(&obj, MODALITY, "");
    if !modality.is_empty() && !SUPPORTED_MODALITIES.contains(&modality.as_str()) {
        return (false, format!("Unsupported modality: {}", modality));
    }
    if obj.element(PIXEL_DATA).is_err() {
        return (false, "No pixel data found".to_string());
    }
    (true, "Valid DICOM file".to_string())
}

/// Sample layout of the first frame of a pixel data element
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PixelLayout {
    pub rows: usize,
    pub columns: usize,
    pub samples_per_pixel: usize,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub signed: bool,
    /// Color-by-plane (PlanarConfiguration = 1)
    pub planar: bool,
    pub photometric: String,
}

impl PixelLayout {
    fn bytes_per_sample(&self) -> Result<usize> {
        match self.bits_allocated {
            8 => Ok(1),
            16 => Ok(2),
            32 => Ok(4),
            other => Err(RetinaError::UnsupportedShape(format!(
                "unsupported BitsAllocated {}",
                other
            ))),
        }
    }

    fn frame_samples(&self) -> usize {
        self.rows * self.columns * self.samples_per_pixel
    }
}

/// Decodes the first frame of a DICOM object into a 3-channel canonical image
///
/// # Errors
///
/// Returns [`RetinaError::DecodeError`] if the object has no decodable pixel
/// data and [`RetinaError::UnsupportedShape`] for unsupported sample layouts
pub fn decode_dicom(obj: &DefaultDicomObject) -> Result<CanonicalImage> {
    let pixel_element = obj
        .element(PIXEL_DATA)
        .map_err(|_| RetinaError::DecodeError("DICOM file does not contain pixel data".into()))?;
    // Encapsulated data comes out of the codecs interleaved
    let encapsulated = matches!(pixel_element.value(), Value::PixelSequence(_));

    let decoded = obj.decode_pixel_data()?;
    let layout = PixelLayout {
        rows: decoded.rows() as usize,
        columns: decoded.columns() as usize,
        samples_per_pixel: decoded.samples_per_pixel() as usize,
        bits_allocated: decoded.bits_allocated(),
        bits_stored: get_u16_value(obj, BITS_STORED)
            .or_else(|| get_u16_value(obj, BITS_ALLOCATED))
            .unwrap_or(decoded.bits_allocated()),
        signed: get_u16_value(obj, PIXEL_REPRESENTATION) == Some(1),
        planar: !encapsulated && get_u16_value(obj, PLANAR_CONFIGURATION) == Some(1),
        photometric: get_string_or(obj, PHOTOMETRIC_INTERPRETATION, ""),
    };
    debug!(
        "Decoding DICOM pixels: {}x{} spp={} bits={} photometric={}",
        layout.rows, layout.columns, layout.samples_per_pixel, layout.bits_allocated, layout.photometric
    );
    decode_samples(decoded.data(), &layout)
}

/// Converts raw little-endian samples of the first frame into a canonical image
pub(crate) fn decode_samples(data: &[u8], layout: &PixelLayout) -> Result<CanonicalImage> {
    let grid = read_first_frame(data, layout)?;

    let mut pixels = if layout.bits_allocated > 8 {
        normalize_to_8bit(&grid)
    } else {
        // Truncating cast, signed 8-bit values wrap
        grid.mapv(|v| v as i64 as u8)
    };

    if layout.photometric == "MONOCHROME1" {
        let max = pixels.iter().copied().max().unwrap_or(0);
        pixels.mapv_inplace(|v| max - v);
    }

    let rgb = to_three_channels(pixels);
    CanonicalImage::new(rgb, layout.bits_stored, SourceFormat::Dicom)
}

/// Reads the first frame as height × width × samples
fn read_first_frame(data: &[u8], layout: &PixelLayout) -> Result<Array3<f64>> {
    let bytes_per_sample = layout.bytes_per_sample()?;
    let count = layout.frame_samples();
    if count == 0 {
        return Err(RetinaError::UnsupportedShape(format!(
            "empty pixel grid {}x{}x{}",
            layout.rows, layout.columns, layout.samples_per_pixel
        )));
    }
    let needed = count * bytes_per_sample;
    if data.len() < needed {
        return Err(RetinaError::DecodeError(format!(
            "pixel data holds {} bytes, first frame needs {}",
            data.len(),
            needed
        )));
    }

    let samples: Vec<f64> = data[..needed]
        .chunks_exact(bytes_per_sample)
        .map(|c| match (bytes_per_sample, layout.signed) {
            (1, false) => f64::from(c[0]),
            (1, true) => f64::from(c[0] as i8),
            (2, false) => f64::from(u16::from_le_bytes([c[0], c[1]])),
            (2, true) => f64::from(i16::from_le_bytes([c[0], c[1]])),
            (_, false) => f64::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            (_, true) => f64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        })
        .collect();

    let (rows, cols, spp) = (layout.rows, layout.columns, layout.samples_per_pixel);
    if layout.planar && spp > 1 {
        let planes = Array3::from_shape_vec((spp, rows, cols), samples)?;
        Ok(planes.permuted_axes([1, 2, 0]).as_standard_layout().to_owned())
    } else {
        Ok(Array3::from_shape_vec((rows, cols, spp), samples)?)
    }
}

/// Linearly rescales to 0..=255 using the observed range
///
/// A constant grid maps to all zeros.
pub(crate) fn normalize_to_8bit(grid: &Array3<f64>) -> Array3<u8> {
    let (min, max) = grid
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max <= min {
        return Array3::zeros(grid.dim());
    }
    let range = max - min;
    grid.mapv(|v| ((v - min) / range * 255.0) as u8)
}

/// Gray becomes RGB, RGB passes through, RGBA drops alpha, anything else keeps channel 0
fn to_three_channels(pixels: Array3<u8>) -> Array3<u8> {
    match pixels.dim().2 {
        3 => pixels,
        4 => pixels.slice(ndarray::s![.., .., 0..3]).to_owned(),
        _ => {
            let first = pixels.index_axis(Axis(2), 0).insert_axis(Axis(2));
            ndarray::concatenate(Axis(2), &[first.view(), first.view(), first.view()])
                .unwrap_or_else(|_| first.to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fixtures::{write_rgb_dicom, GrayDicom};
    use std::io::Write;
    use tempfile::TempDir;

    fn gray_layout(rows: usize, columns: usize, bits: u16, photometric: &str) -> PixelLayout {
        PixelLayout {
            rows,
            columns,
            samples_per_pixel: 1,
            bits_allocated: bits,
            bits_stored: bits,
            signed: false,
            planar: false,
            photometric: photometric.to_string(),
        }
    }

    fn le_u16(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_is_dicom_with_valid_header() {
        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(b"DICM");
        bytes.extend_from_slice(b"additional data");
        assert!(is_dicom_bytes(&bytes));
    }

    #[test]
    fn test_is_dicom_ignores_extension() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("upload.jpg");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(&[0u8; 128]).unwrap();
        file.write_all(b"DICM").unwrap();
        file.write_all(b"additional data").unwrap();
        assert!(is_dicom(&file_path));

        let bare = temp_dir.path().join("noext");
        std::fs::copy(&file_path, &bare).unwrap();
        assert!(is_dicom(&bare));
    }

    #[test]
    fn test_is_dicom_rejects_other_content() {
        assert!(!is_dicom_bytes(b"This is not a DICOM file"));
        assert!(!is_dicom_bytes(&[0u8; 132]));

        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("tiny");
        File::create(&file_path).unwrap().write_all(b"DICM").unwrap();
        assert!(!is_dicom(&file_path));
        assert!(!is_dicom(&temp_dir.path().join("missing")));
    }

    #[test]
    fn test_flat_high_bit_image_is_all_zero() {
        let layout = gray_layout(4, 4, 16, "MONOCHROME2");
        let img = decode_samples(&le_u16(&[1200; 16]), &layout).unwrap();
        assert!(img.pixels().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_normalize_to_8bit_range() {
        let grid = Array3::from_shape_vec((1, 3, 1), vec![100.0, 300.0, 500.0]).unwrap();
        let out = normalize_to_8bit(&grid);
        assert_eq!(out.iter().copied().collect::<Vec<_>>(), vec![0, 127, 255]);
    }

    #[test]
    fn test_monochrome1_inverts_after_scaling() {
        let layout = gray_layout(1, 3, 16, "MONOCHROME1");
        let img = decode_samples(&le_u16(&[0, 2000, 4000]), &layout).unwrap();
        let row: Vec<u8> = (0..3).map(|x| img.pixels()[[0, x, 0]]).collect();
        assert_eq!(row, vec![255, 128, 0]);
    }

    #[test]
    fn test_eight_bit_gray_passes_values() {
        let layout = gray_layout(2, 2, 8, "MONOCHROME2");
        let img = decode_samples(&[0, 10, 20, 30], &layout).unwrap();
        assert_eq!(img.channels(), 3);
        assert_eq!(img.pixels()[[1, 1, 2]], 30);
        assert_eq!(img.bit_depth(), 8);
    }

    #[test]
    fn test_planar_rgb_is_interleaved() {
        let layout = PixelLayout {
            samples_per_pixel: 3,
            planar: true,
            photometric: "RGB".into(),
            ..gray_layout(1, 2, 8, "")
        };
        // R plane, G plane, B plane
        let img = decode_samples(&[1, 2, 3, 4, 5, 6], &layout).unwrap();
        assert_eq!(img.pixels()[[0, 0, 0]], 1);
        assert_eq!(img.pixels()[[0, 0, 1]], 3);
        assert_eq!(img.pixels()[[0, 1, 2]], 6);
    }

    #[test]
    fn test_four_samples_drop_alpha() {
        let layout = PixelLayout {
            samples_per_pixel: 4,
            ..gray_layout(1, 1, 8, "ARGB")
        };
        let img = decode_samples(&[9, 8, 7, 6], &layout).unwrap();
        assert_eq!(img.channels(), 3);
        assert_eq!(img.pixels().iter().copied().collect::<Vec<_>>(), vec![9, 8, 7]);
    }

    #[test]
    fn test_two_samples_use_first_channel() {
        let layout = PixelLayout {
            samples_per_pixel: 2,
            ..gray_layout(1, 1, 8, "")
        };
        let img = decode_samples(&[42, 99], &layout).unwrap();
        assert_eq!(img.pixels().iter().copied().collect::<Vec<_>>(), vec![42, 42, 42]);
    }

    #[test]
    fn test_truncated_pixel_data_is_decode_error() {
        let layout = gray_layout(4, 4, 16, "MONOCHROME2");
        assert!(matches!(
            decode_samples(&[0u8; 10], &layout),
            Err(RetinaError::DecodeError(_))
        ));
    }

    #[test]
    fn test_decode_monochrome1_16bit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scan.dcm");
        let pixels: Vec<u16> = (0..512 * 512).map(|i| (i % 4096) as u16).collect();
        GrayDicom::new(512, 512, pixels)
            .photometric("MONOCHROME1")
            .write(&path);

        let obj = read_dicom_file(&path).unwrap();
        let img = decode_dicom(&obj).unwrap();
        assert_eq!((img.height(), img.width(), img.channels()), (512, 512, 3));
        assert_eq!(img.bit_depth(), 16);
        assert_eq!(img.source(), SourceFormat::Dicom);
        // Lowest raw value becomes the brightest pixel
        assert_eq!(img.pixels()[[0, 0, 0]], 255);
        assert_eq!(img.pixels()[[0, 0, 1]], img.pixels()[[0, 0, 2]]);
    }

    #[test]
    fn test_decode_rgb_file_and_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fundus");
        let rgb: Vec<u8> = (0..2 * 2 * 3).map(|v| v as u8 * 10).collect();
        write_rgb_dicom(&path, 2, 2, &rgb);

        let bytes = std::fs::read(&path).unwrap();
        assert!(is_dicom_bytes(&bytes));
        let img = decode_dicom(&read_dicom_bytes(&bytes).unwrap()).unwrap();
        assert_eq!(img.pixels()[[1, 1, 2]], 110);
    }

    #[test]
    fn test_validate_dicom() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.dcm");
        GrayDicom::new(2, 2, vec![0, 1, 2, 3]).write(&good);
        assert_eq!(validate_dicom(&good), (true, "Valid DICOM file".to_string()));

        let wrong_modality = temp_dir.path().join("nm.dcm");
        GrayDicom::new(2, 2, vec![0, 1, 2, 3]).modality("NM").write(&wrong_modality);
        let (valid, message) = validate_dicom(&wrong_modality);
        assert!(!valid);
        assert_eq!(message, "Unsupported modality: NM");

        let garbage = temp_dir.path().join("garbage.dcm");
        std::fs::write(&garbage, b"nope").unwrap();
        assert!(!validate_dicom(&garbage).0);
    }
}
