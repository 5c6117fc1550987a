//! Synthetic DICOM and raster files for tests

use super::tags;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::InMemDicomObject;
use std::path::Path;

const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";
const OPHTHALMIC_PHOTOGRAPHY_8BIT: &str = "1.2.840.10008.5.1.4.1.1.77.1.5.1";

/// Description of a single-frame grayscale DICOM to synthesize
pub struct GrayDicom<'a> {
    pub rows: u16,
    pub columns: u16,
    pub pixels: Vec<u16>,
    pub photometric: &'a str,
    pub modality: &'a str,
    pub patient_id: &'a str,
    pub patient_name: &'a str,
}

impl<'a> GrayDicom<'a> {
    pub fn new(rows: u16, columns: u16, pixels: Vec<u16>) -> Self {
        Self {
            rows,
            columns,
            pixels,
            photometric: "MONOCHROME2",
            modality: "OPT",
            patient_id: "PAT-001",
            patient_name: "Doe^Jane",
        }
    }

    pub fn photometric(mut self, photometric: &'a str) -> Self {
        self.photometric = photometric;
        self
    }

    pub fn modality(mut self, modality: &'a str) -> Self {
        self.modality = modality;
        self
    }

    /// Writes a 16-bit explicit VR little endian file
    pub fn write(&self, path: &Path) {
        let mut obj = InMemDicomObject::new_empty();
        let put_str = |obj: &mut InMemDicomObject, tag, vr, value: &str| {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        };
        put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, SECONDARY_CAPTURE);
        put_str(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.5.6");
        put_str(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3.4.5");
        put_str(&mut obj, tags::MODALITY, VR::CS, self.modality);
        put_str(&mut obj, tags::PATIENT_ID, VR::LO, self.patient_id);
        put_str(&mut obj, tags::PATIENT_NAME, VR::PN, self.patient_name);
        put_str(&mut obj, tags::PATIENT_BIRTH_DATE, VR::DA, "19600101");
        put_str(&mut obj, tags::PATIENT_SEX, VR::CS, "F");
        put_str(&mut obj, tags::STUDY_DATE, VR::DA, "20240131");
        put_str(&mut obj, tags::SERIES_DESCRIPTION, VR::LO, "Macular Cube");
        put_str(&mut obj, tags::MANUFACTURER, VR::LO, "Acme Imaging");
        put_str(&mut obj, tags::PIXEL_SPACING, VR::DS, "0.0114\\0.0039");
        put_str(&mut obj, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, self.photometric);
        obj.put(DataElement::new(
            tags::IMAGE_TYPE,
            VR::CS,
            PrimitiveValue::Strs(vec!["ORIGINAL".to_string(), "PRIMARY".to_string()].into()),
        ));
        for (tag, value) in [
            (tags::SAMPLES_PER_PIXEL, 1_u16),
            (tags::ROWS, self.rows),
            (tags::COLUMNS, self.columns),
            (tags::BITS_ALLOCATED, 16),
            (tags::BITS_STORED, 16),
            (tags::HIGH_BIT, 15),
            (tags::PIXEL_REPRESENTATION, 0),
        ] {
            obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
        }
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(self.pixels.clone().into()),
        ));

        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(EXPLICIT_VR_LE)
                    .media_storage_sop_class_uid(SECONDARY_CAPTURE)
                    .media_storage_sop_instance_uid("1.2.3.4.5.6"),
            )
            .unwrap();
        file.write_to_file(path).unwrap();
    }
}

/// Writes an 8-bit RGB DICOM with interleaved samples
pub fn write_rgb_dicom(path: &Path, rows: u16, columns: u16, rgb: &[u8]) {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(OPHTHALMIC_PHOTOGRAPHY_8BIT)));
    obj.put(DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.3.9")));
    obj.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("OP")));
    obj.put(DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("RGB")));
    for (tag, value) in [
        (tags::SAMPLES_PER_PIXEL, 3_u16),
        (tags::PLANAR_CONFIGURATION, 0),
        (tags::ROWS, rows),
        (tags::COLUMNS, columns),
        (tags::BITS_ALLOCATED, 8),
        (tags::BITS_STORED, 8),
        (tags::HIGH_BIT, 7),
        (tags::PIXEL_REPRESENTATION, 0),
    ] {
        obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
    }
    obj.put(DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::U8(rgb.to_vec().into())));
    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LE)
                .media_storage_sop_class_uid(OPHTHALMIC_PHOTOGRAPHY_8BIT)
                .media_storage_sop_instance_uid("1.2.3.9"),
        )
        .unwrap();
    file.write_to_file(path).unwrap();
}

/// Writes a PNG with a horizontal gradient
pub fn write_png(path: &Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}
