use serde::{Deserialize, Serialize};

/// Calibration outcome for quantifying one component against its internal
/// standard. Shared by reference across a sequence segment's injections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantitationMethod {
    pub component_name: String,
    /// Internal-standard component name.
    pub is_name: String,
    pub concentration_units: String,
    pub transformation_model: String,
    #[serde(default)]
    pub llod: Option<f64>,
    #[serde(default)]
    pub ulod: Option<f64>,
    #[serde(default)]
    pub lloq: Option<f64>,
    #[serde(default)]
    pub uloq: Option<f64>,
    #[serde(default)]
    pub correlation_coefficient: Option<f64>,
    #[serde(default)]
    pub n_points: Option<u32>,
}

impl QuantitationMethod {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            ..Self::default()
        }
    }
}

/// One point of a calibration curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub sample_name: String,
    pub concentration: f64,
    pub response: f64,
}

/// Per-component record the calibration step leaves on the segment.
///
/// Outlier points (flagged by the fit) and excluded points (removed before
/// the fit) are distinct sets; a processor must fill them from distinct
/// outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub component_name: String,
    #[serde(default)]
    pub model: Option<QuantitationMethod>,
    pub outlier_points: Vec<CalibrationPoint>,
    pub excluded_points: Vec<CalibrationPoint>,
}

impl CalibrationRecord {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_and_excluded_sets_are_independent() {
        let mut record = CalibrationRecord::new("glu-L");
        record.outlier_points.push(CalibrationPoint {
            sample_name: "Level1".into(),
            concentration: 0.5,
            response: 0.04,
        });
        record.excluded_points.push(CalibrationPoint {
            sample_name: "Level9".into(),
            concentration: 500.0,
            response: 13.1,
        });
        assert_eq!(record.outlier_points.len(), 1);
        assert_eq!(record.excluded_points.len(), 1);
        assert_ne!(record.outlier_points, record.excluded_points);
    }
}
