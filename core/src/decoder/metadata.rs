use super::tags::{
    get_float_value, get_int_value, get_multi_float_value, get_multi_string_value,
    get_person_name, get_string_or, get_u16_value, BITS_ALLOCATED, BITS_STORED, COLUMNS,
    IMAGE_TYPE, INSTITUTION_NAME, MANUFACTURER, MANUFACTURER_MODEL_NAME, MODALITY,
    PATIENT_AGE, PATIENT_BIRTH_DATE, PATIENT_ID, PATIENT_NAME, PATIENT_SEX, PIXEL_SPACING, ROWS,
    SERIES_DESCRIPTION, SERIES_NUMBER, SLICE_THICKNESS, STUDY_DATE, STUDY_DESCRIPTION,
    STUDY_INSTANCE_UID, STUDY_TIME,
};
use crate::types::{ImageType, PixelSpacing};
use dicom_object::InMemDicomObject;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Replacement for non-empty patient names
pub const ANONYMOUS_NAME: &str = "ANONYMOUS";

/// Prefix of hashed patient identifiers
pub const ANON_ID_PREFIX: &str = "ANON_";

/// Key/value record extracted from a DICOM dataset
///
/// Absent text attributes are empty strings and absent counts are zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DicomMetadata {
    // Patient
    pub patient_id: String,
    pub patient_name: String,
    pub patient_sex: String,
    pub patient_age: String,
    pub patient_birth_date: String,

    // Study
    pub study_date: String,
    pub study_time: String,
    pub study_description: String,
    pub study_instance_uid: String,

    // Series
    pub series_description: String,
    pub series_number: Option<i32>,
    pub modality: String,

    // Site and device
    pub institution_name: String,
    pub manufacturer: String,
    pub manufacturer_model_name: String,

    // Image
    pub image_type: Option<ImageType>,
    pub rows: u16,
    pub columns: u16,
    pub pixel_spacing: Option<PixelSpacing>,
    pub slice_thickness: Option<f64>,
    pub bits_allocated: u16,
    pub bits_stored: u16,
}

impl DicomMetadata {
    /// Extracts the metadata record from a dataset, tolerating absent tags
    pub fn extract(dcm: &InMemDicomObject) -> Self {
        let pixel_spacing = get_multi_float_value(dcm, PIXEL_SPACING)
            .and_then(|values| PixelSpacing::from_values(&values))
            .or_else(|| {
                super::tags::get_string_value(dcm, PIXEL_SPACING)
                    .and_then(|s| PixelSpacing::parse(&s).ok())
            });

        Self {
            patient_id: get_string_or(dcm, PATIENT_ID, ""),
            patient_name: get_person_name(dcm, PATIENT_NAME).unwrap_or_default(),
            patient_sex: get_string_or(dcm, PATIENT_SEX, ""),
            patient_age: get_string_or(dcm, PATIENT_AGE, ""),
            patient_birth_date: get_string_or(dcm, PATIENT_BIRTH_DATE, ""),
            study_date: get_string_or(dcm, STUDY_DATE, ""),
            study_time: get_string_or(dcm, STUDY_TIME, ""),
            study_description: get_string_or(dcm, STUDY_DESCRIPTION, ""),
            study_instance_uid: get_string_or(dcm, STUDY_INSTANCE_UID, ""),
            series_description: get_string_or(dcm, SERIES_DESCRIPTION, ""),
            series_number: get_int_value(dcm, SERIES_NUMBER),
            modality: get_string_or(dcm, MODALITY, ""),
            institution_name: get_string_or(dcm, INSTITUTION_NAME, ""),
            manufacturer: get_string_or(dcm, MANUFACTURER, ""),
            manufacturer_model_name: get_string_or(dcm, MANUFACTURER_MODEL_NAME, ""),
            image_type: get_multi_string_value(dcm, IMAGE_TYPE)
                .and_then(|values| ImageType::from_values(&values)),
            rows: get_u16_value(dcm, ROWS).unwrap_or(0),
            columns: get_u16_value(dcm, COLUMNS).unwrap_or(0),
            pixel_spacing,
            slice_thickness: get_float_value(dcm, SLICE_THICKNESS),
            bits_allocated: get_u16_value(dcm, BITS_ALLOCATED).unwrap_or(0),
            bits_stored: get_u16_value(dcm, BITS_STORED).unwrap_or(0),
        }
    }

    /// Returns a copy with patient-identifying fields replaced
    ///
    /// - non-empty patient name becomes [`ANONYMOUS_NAME`]
    /// - non-empty patient id becomes `ANON_` plus the first 8 hex digits of its SHA-256
    /// - birth date is cleared
    ///
    /// The mapping is deterministic, so one patient keeps one pseudonym.
    pub fn anonymize(&self) -> Self {
        let mut anonymized = self.clone();
        if !anonymized.patient_name.is_empty() {
            anonymized.patient_name = ANONYMOUS_NAME.to_string();
        }
        if !anonymized.patient_id.is_empty() {
            anonymized.patient_id = pseudonymize_id(&self.patient_id);
        }
        anonymized.patient_birth_date.clear();
        anonymized
    }
}

fn pseudonymize_id(id: &str) -> String {
    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    format!("{}{}", ANON_ID_PREFIX, &digest[..8])
}

impl fmt::Display for DicomMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        writeln!(f, "Patient ID:        {}", or_dash(&self.patient_id))?;
        writeln!(f, "Patient name:      {}", or_dash(&self.patient_name))?;
        writeln!(f, "Sex / age:         {} / {}", or_dash(&self.patient_sex), or_dash(&self.patient_age))?;
        writeln!(f, "Study date:        {} {}", or_dash(&self.study_date), self.study_time)?;
        writeln!(f, "Study:             {}", or_dash(&self.study_description))?;
        writeln!(f, "Series:            {}", or_dash(&self.series_description))?;
        writeln!(f, "Modality:          {}", or_dash(&self.modality))?;
        writeln!(f, "Manufacturer:      {} {}", or_dash(&self.manufacturer), self.manufacturer_model_name)?;
        if let Some(ref image_type) = self.image_type {
            writeln!(f, "Image type:        {}", image_type)?;
        }
        writeln!(f, "Size:              {} x {}", self.rows, self.columns)?;
        if let Some(spacing) = self.pixel_spacing {
            writeln!(f, "Pixel spacing:     {}", spacing)?;
        }
        write!(f, "Bits:              {} allocated, {} stored", self.bits_allocated, self.bits_stored)
    }
}
