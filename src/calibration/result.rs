// CalibrationResult - fitted sensor-to-weight curve

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationPoint;

/// Regression model used for the curve
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CalibrationMethod {
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "polynomial_2", alias = "poly2")]
    Polynomial2,
    #[serde(rename = "polynomial_3", alias = "poly3")]
    Polynomial3,
}

impl CalibrationMethod {
    pub const ALL: [CalibrationMethod; 3] = [
        CalibrationMethod::Linear,
        CalibrationMethod::Polynomial2,
        CalibrationMethod::Polynomial3,
    ];

    pub fn degree(&self) -> usize {
        match self {
            CalibrationMethod::Linear => 1,
            CalibrationMethod::Polynomial2 => 2,
            CalibrationMethod::Polynomial3 => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationMethod::Linear => "linear",
            CalibrationMethod::Polynomial2 => "polynomial_2",
            CalibrationMethod::Polynomial3 => "polynomial_3",
        }
    }
}

impl std::fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CalibrationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(CalibrationMethod::Linear),
            "polynomial_2" | "poly2" => Ok(CalibrationMethod::Polynomial2),
            "polynomial_3" | "poly3" => Ok(CalibrationMethod::Polynomial3),
            other => Err(format!("unknown calibration method: {}", other)),
        }
    }
}

/// R²-based bucket shown to operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    pub fn from_r_squared(r_squared: f64) -> Self {
        if r_squared >= 0.99 {
            QualityGrade::Excellent
        } else if r_squared >= 0.95 {
            QualityGrade::Good
        } else if r_squared >= 0.90 {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }
}

impl std::fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            QualityGrade::Excellent => "Excellent",
            QualityGrade::Good => "Good",
            QualityGrade::Fair => "Fair",
            QualityGrade::Poor => "Poor",
        };
        f.write_str(label)
    }
}

/// Fitted calibration curve plus the points it was fitted on
///
/// Coefficients are ordered from the highest power down to the constant term,
/// so a linear curve stores `[slope, intercept]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationResult {
    pub method: CalibrationMethod,
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
    pub rmse: f64,
    /// Unix seconds
    pub created_time: f64,
    #[serde(default)]
    pub validation_passed: bool,
    pub points: Vec<CalibrationPoint>,
}

impl CalibrationResult {
    /// Convert a filtered sensor value to physical units
    pub fn apply(&self, sensor_value: f64) -> f64 {
        if self.coefficients.is_empty() {
            return sensor_value;
        }
        evaluate_polynomial(&self.coefficients, sensor_value)
    }

    pub fn quality_grade(&self) -> QualityGrade {
        QualityGrade::from_r_squared(self.r_squared)
    }

    /// Slope of a linear curve
    pub fn slope(&self) -> Option<f64> {
        match self.method {
            CalibrationMethod::Linear => self.coefficients.first().copied(),
            _ => None,
        }
    }

    pub fn intercept(&self) -> Option<f64> {
        self.coefficients.last().copied()
    }
}

/// Horner evaluation of highest-power-first coefficients
pub fn evaluate_polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, c| acc * x + c)
}

/// Summary of the active calibration for status displays
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationInfo {
    pub method: CalibrationMethod,
    pub quality_grade: QualityGrade,
    pub r_squared: f64,
    pub rmse: f64,
    pub validation_passed: bool,
    pub created_time: f64,
    pub point_count: usize,
}

impl From<&CalibrationResult> for CalibrationInfo {
    fn from(result: &CalibrationResult) -> Self {
        Self {
            method: result.method,
            quality_grade: result.quality_grade(),
            r_squared: result.r_squared,
            rmse: result.rmse,
            validation_passed: result.validation_passed,
            created_time: result.created_time,
            point_count: result.points.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(method: CalibrationMethod, coefficients: Vec<f64>, r_squared: f64) -> CalibrationResult {
        CalibrationResult {
            method,
            coefficients,
            r_squared,
            rmse: 0.0,
            created_time: 0.0,
            validation_passed: false,
            points: Vec::new(),
        }
    }

    #[test]
    fn test_apply_linear_and_polynomial() {
        let linear = result(CalibrationMethod::Linear, vec![10.0, -10.0], 1.0);
        assert_eq!(linear.apply(2.0), 10.0);
        assert_eq!(linear.slope(), Some(10.0));
        assert_eq!(linear.intercept(), Some(-10.0));

        // 2x^2 + 3x + 1
        let quadratic = result(CalibrationMethod::Polynomial2, vec![2.0, 3.0, 1.0], 1.0);
        assert_eq!(quadratic.apply(2.0), 15.0);
        assert_eq!(quadratic.slope(), None);

        // x^3 - x
        let cubic = result(CalibrationMethod::Polynomial3, vec![1.0, 0.0, -1.0, 0.0], 1.0);
        assert_eq!(cubic.apply(3.0), 24.0);
    }

    #[test]
    fn test_empty_coefficients_pass_through() {
        let empty = result(CalibrationMethod::Linear, Vec::new(), 1.0);
        assert_eq!(empty.apply(7.5), 7.5);
    }

    #[test]
    fn test_quality_grade_thresholds() {
        assert_eq!(QualityGrade::from_r_squared(0.995), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_r_squared(0.99), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_r_squared(0.96), QualityGrade::Good);
        assert_eq!(QualityGrade::from_r_squared(0.92), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_r_squared(0.80), QualityGrade::Poor);
    }

    #[test]
    fn test_method_names() {
        assert_eq!(
            serde_json::to_string(&CalibrationMethod::Polynomial2).unwrap(),
            "\"polynomial_2\""
        );
        let parsed: CalibrationMethod = serde_json::from_str("\"poly3\"").unwrap();
        assert_eq!(parsed, CalibrationMethod::Polynomial3);
        assert_eq!("linear".parse::<CalibrationMethod>(), Ok(CalibrationMethod::Linear));
        assert!("cubic".parse::<CalibrationMethod>().is_err());
    }

    #[test]
    fn test_info_from_result() {
        let mut r = result(CalibrationMethod::Linear, vec![1.0, 0.0], 0.97);
        r.validation_passed = true;
        let info = CalibrationInfo::from(&r);
        assert_eq!(info.quality_grade, QualityGrade::Good);
        assert!(info.validation_passed);
        assert_eq!(info.point_count, 0);
    }
}
