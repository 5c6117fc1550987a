use serde::Serialize;

/// Static configuration of one biomarker regressor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BiomarkerSpec {
    /// Biomarker name as exposed to callers
    pub name: &'static str,
    /// Unit of the predicted value
    pub unit: &'static str,
    /// Reference range shown next to the value
    pub normal_range: &'static str,
    /// Multiplier applied to the raw network output
    pub scale_factor: f64,
    /// Value reported when the regressor cannot produce one
    #[serde(skip)]
    pub fallback_value: f64,
}

impl BiomarkerSpec {
    /// Directory under the models root holding this biomarker's artifact
    ///
    /// Spaces and dashes become underscores, `%` becomes `pct`.
    pub fn directory_name(&self) -> String {
        self.name
            .replace(' ', "_")
            .replace('%', "pct")
            .replace('-', "_")
    }
}

macro_rules! biomarker {
    ($name:expr, $unit:expr, $range:expr, $fallback:expr) => {
        BiomarkerSpec {
            name: $name,
            unit: $unit,
            normal_range: $range,
            scale_factor: 1.0,
            fallback_value: $fallback,
        }
    };
}

/// Every supported biomarker
pub const BIOMARKERS: [BiomarkerSpec; 18] = [
    biomarker!("Age", "years", "18-80", 45.2),
    biomarker!("BMI", "kg/m^2", "18.5-24.9", 23.5),
    biomarker!("BP_OUT_CALC_AVG_DIASTOLIC_BP", "mmHg", "60-80", 72.0),
    biomarker!("BP_OUT_CALC_AVG_SYSTOLIC_BP", "mmHg", "90-120", 118.0),
    // Lipid profile
    biomarker!("Cholesterol Total", "mmol/L", "<5.2", 185.0),
    biomarker!("HDL-Cholesterol", "mmol/L", ">1.0 (M), >1.3 (F)", 55.0),
    biomarker!("LDL-Cholesterol Calc", "mmol/L", "<2.6", 95.0),
    biomarker!("Triglyceride", "mmol/L", "<1.7", 120.0),
    // Metabolic
    biomarker!("Glucose", "mmol/L", "3.9-5.6", 95.0),
    biomarker!("HbA1C %", "%", "<5.7", 5.2),
    biomarker!("Insulin", "mcunit/mL", "2.6-24.9", 12.5),
    // Blood
    biomarker!("Hematocrit", "%", "36-46 (F), 41-50 (M)", 42.0),
    biomarker!("Hemoglobin", "g/dL", "12-15.5 (F), 13.5-17.5 (M)", 14.2),
    biomarker!("Red Blood Cell", "x10^6/µL", "4.0-5.2 (F), 4.7-6.1 (M)", 4.8),
    // Kidney
    biomarker!("Creatinine", "µmol/L", "53-115", 0.9),
    // Hormones
    biomarker!("Sex Hormone Binding Globulin", "nmol/L", "18-144", 45.0),
    biomarker!("Estradiol", "pmol/L", "55-1285", 150.0),
    biomarker!("Testosterone Total", "nmol/L", "10-35 (M), 0.5-2.4 (F)", 450.0),
];

/// Looks up a biomarker by exact name
pub fn lookup(name: &str) -> Option<&'static BiomarkerSpec> {
    BIOMARKERS.iter().find(|spec| spec.name == name)
}

/// Names of all supported biomarkers in table order
pub fn names() -> Vec<&'static str> {
    BIOMARKERS.iter().map(|spec| spec.name).collect()
}
