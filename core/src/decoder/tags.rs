//! Tags read by the decoder and tolerant value getters
//!
//! Tag constants come from the standard data dictionary.

use dicom_core::dictionary::DataDictionary;
use dicom_core::Tag;
use dicom_dictionary_std::StandardDataDictionary;
use dicom_object::InMemDicomObject;

// Identification Tags
pub use dicom_dictionary_std::tags::{
    IMAGE_TYPE, MODALITY, SERIES_NUMBER, SOP_CLASS_UID, SOP_INSTANCE_UID, STUDY_INSTANCE_UID,
};

// Study/Series Tags
pub use dicom_dictionary_std::tags::{
    SERIES_DESCRIPTION, STUDY_DATE, STUDY_DESCRIPTION, STUDY_TIME,
};

// Patient Tags
pub use dicom_dictionary_std::tags::{
    PATIENT_AGE, PATIENT_BIRTH_DATE, PATIENT_ID, PATIENT_NAME, PATIENT_SEX,
};

// Device/Site Tags
pub use dicom_dictionary_std::tags::{INSTITUTION_NAME, MANUFACTURER, MANUFACTURER_MODEL_NAME};

// Image Pixel Module Tags
pub use dicom_dictionary_std::tags::{
    BITS_ALLOCATED, BITS_STORED, COLUMNS, HIGH_BIT, PHOTOMETRIC_INTERPRETATION, PIXEL_DATA,
    PIXEL_REPRESENTATION, PIXEL_SPACING, PLANAR_CONFIGURATION, ROWS, SAMPLES_PER_PIXEL,
    SLICE_THICKNESS,
};

/// Standard keyword of a tag, e.g. `PixelSpacing`
pub fn tag_name(tag: Tag) -> Option<&'static str> {
    StandardDataDictionary.by_tag(tag).map(|entry| entry.alias)
}

/// Helper to get string value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to string.
/// Multi-valued elements come back joined with `\`.
pub fn get_string_value(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| s.trim_end_matches('\0').trim().to_string())
}

/// Helper to get a string value, substituting `default` when absent
pub fn get_string_or(dcm: &InMemDicomObject, tag: Tag, default: &str) -> String {
    get_string_value(dcm, tag).unwrap_or_else(|| default.to_string())
}

/// Helper to get a person name as a plain string
///
/// Component separators are kept, trailing empty components are dropped
/// (`Doe^John^^` becomes `Doe^John`).
pub fn get_person_name(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    get_string_value(dcm, tag).map(|s| s.trim_end_matches('^').to_string())
}

/// Helper to get integer value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to i32
pub fn get_int_value(dcm: &InMemDicomObject, tag: Tag) -> Option<i32> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_int::<i32>().ok())
}

/// Helper to get u16 value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to u16
pub fn get_u16_value(dcm: &InMemDicomObject, tag: Tag) -> Option<u16> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_int::<u16>().ok())
}

/// Helper to get a float value from DICOM tag
pub fn get_float_value(dcm: &InMemDicomObject, tag: Tag) -> Option<f64> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_float64().ok())
}

/// Helper to get all float values of a multi-valued tag, in order
pub fn get_multi_float_value(dcm: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_multi_float64().ok())
}

/// Helper to get multi-string value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to Vec<String>
pub fn get_multi_string_value(dcm: &InMemDicomObject, tag: Tag) -> Option<Vec<String>> {
    dcm.element(tag).ok().and_then(|elem| {
        if let Ok(strs) = elem.to_multi_str() {
            Some(strs.iter().map(|s| s.trim().to_string()).collect())
        } else {
            // Fallback: split a single string on the value delimiter
            elem.to_str()
                .ok()
                .map(|s| s.split('\\').map(|part| part.trim().to_string()).collect())
        }
    })
}
