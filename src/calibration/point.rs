// CalibrationPoint - readings collected for one reference weight

use serde::{Deserialize, Serialize};

use crate::processing::statistics::{mean, std_dev};

/// Readings collected at one reference weight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationPoint {
    /// Reference weight (g)
    pub reference_weight: f64,
    /// Steady-state sensor readings
    pub sensor_readings: Vec<f64>,
    /// Unix seconds when collection started
    pub collection_time: f64,
    /// Computed when the point is completed
    /// Defaults to 1.0 for files written before the field existed
    #[serde(default = "default_quality_score")]
    pub quality_score: f64,
}

/// Default quality score for serde deserialization
fn default_quality_score() -> f64 {
    1.0
}

impl CalibrationPoint {
    pub fn new(reference_weight: f64, collection_time: f64) -> Self {
        Self {
            reference_weight,
            sensor_readings: Vec::new(),
            collection_time,
            quality_score: default_quality_score(),
        }
    }

    /// Mean reading (0.0 without readings)
    pub fn average_reading(&self) -> f64 {
        mean(&self.sensor_readings)
    }

    /// Population standard deviation (0.0 with fewer than two readings)
    pub fn std_reading(&self) -> f64 {
        if self.sensor_readings.len() < 2 {
            return 0.0;
        }
        std_dev(&self.sensor_readings)
    }

    /// Coefficient of variation in percent (0.0 when the mean is zero)
    pub fn cv_percentage(&self) -> f64 {
        let avg = self.average_reading();
        if avg == 0.0 {
            return 0.0;
        }
        self.std_reading() / avg.abs() * 100.0
    }

    pub fn grade(&self) -> PointGrade {
        PointGrade::from_score(self.quality_score)
    }
}

/// Operator-facing bucket for a point's quality score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PointGrade {
    Excellent,
    Good,
    Poor,
}

impl PointGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            PointGrade::Excellent
        } else if score >= 0.7 {
            PointGrade::Good
        } else {
            PointGrade::Poor
        }
    }
}

impl std::fmt::Display for PointGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PointGrade::Excellent => "Excellent",
            PointGrade::Good => "Good",
            PointGrade::Poor => "Poor",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_statistics() {
        let mut point = CalibrationPoint::new(10.0, 0.0);
        assert_eq!(point.average_reading(), 0.0);
        assert_eq!(point.cv_percentage(), 0.0);

        point.sensor_readings = vec![99.0, 101.0];
        assert!((point.average_reading() - 100.0).abs() < 1e-12);
        assert!((point.std_reading() - 1.0).abs() < 1e-12);
        assert!((point.cv_percentage() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_reading_has_no_spread() {
        let mut point = CalibrationPoint::new(0.0, 0.0);
        point.sensor_readings = vec![3.0];
        assert_eq!(point.std_reading(), 0.0);
    }

    #[test]
    fn test_point_grades() {
        assert_eq!(PointGrade::from_score(1.0), PointGrade::Excellent);
        assert_eq!(PointGrade::from_score(0.9), PointGrade::Excellent);
        assert_eq!(PointGrade::from_score(0.7), PointGrade::Good);
        assert_eq!(PointGrade::from_score(0.5), PointGrade::Poor);
        assert_eq!(PointGrade::from_score(0.35).to_string(), "Poor");
    }

    #[test]
    fn test_missing_quality_score_defaults_to_one() {
        let json = r#"{"reference_weight": 5.0, "sensor_readings": [1.0], "collection_time": 12.5}"#;
        let point: CalibrationPoint = serde_json::from_str(json).unwrap();
        assert_eq!(point.quality_score, 1.0);
        assert_eq!(point.grade(), PointGrade::Excellent);
    }
}
