// Calibration persistence - JSON files holding a finished CalibrationResult
//
// Files written by older builds may lack `validation_passed` and the per-point
// `quality_score`; both fall back to their serde defaults on load. A file whose
// coefficient count does not match its method is rejected.

use std::fs;
use std::path::Path;

use crate::calibration::CalibrationResult;
use crate::error::CalibrationError;

fn persistence_error(path: &Path, reason: impl ToString) -> CalibrationError {
    CalibrationError::Persistence {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Write a calibration result as pretty-printed JSON
pub fn save_calibration<P: AsRef<Path>>(
    result: &CalibrationResult,
    path: P,
) -> Result<(), CalibrationError> {
    let path = path.as_ref();
    let json =
        serde_json::to_string_pretty(result).map_err(|err| persistence_error(path, err))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| persistence_error(path, err))?;
    }
    fs::write(path, json).map_err(|err| persistence_error(path, err))?;

    log::info!(
        "[Calibration] Saved {} calibration to {:?}",
        result.method,
        path
    );
    Ok(())
}

/// Read a calibration result previously written by [`save_calibration`]
pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<CalibrationResult, CalibrationError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|err| persistence_error(path, err))?;
    let result: CalibrationResult = serde_json::from_str(&contents).map_err(|err| {
        log::warn!("[Calibration] Failed to parse {:?}: {}", path, err);
        persistence_error(path, err)
    })?;

    let expected = result.method.degree() + 1;
    if result.coefficients.len() != expected {
        log::warn!(
            "[Calibration] Rejected {:?}: {} expects {} coefficients, found {}",
            path,
            result.method,
            expected,
            result.coefficients.len()
        );
        return Err(persistence_error(
            path,
            format!(
                "{} calibration needs {} coefficients, found {}",
                result.method,
                expected,
                result.coefficients.len()
            ),
        ));
    }

    log::info!(
        "[Calibration] Loaded {} calibration (R²={:.4}) from {:?}",
        result.method,
        result.r_squared,
        path
    );
    Ok(result)
}
