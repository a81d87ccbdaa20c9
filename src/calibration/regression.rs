//! Least-squares fitting of reference weights against mean sensor readings.

use crate::calibration::result::evaluate_polynomial;
use crate::calibration::CalibrationMethod;
use crate::error::CalibrationError;

/// Coefficients (highest power first) and goodness of fit
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
    pub rmse: f64,
}

const PIVOT_EPSILON: f64 = 1e-12;

/// Fit `y ≈ f(x)` with the model selected by `method`
pub fn fit(method: CalibrationMethod, x: &[f64], y: &[f64]) -> Result<FitOutcome, CalibrationError> {
    match method {
        CalibrationMethod::Linear => linear_fit(x, y),
        other => polynomial_fit(x, y, other.degree()),
    }
}

/// Ordinary least squares line; R² is the squared correlation coefficient
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<FitOutcome, CalibrationError> {
    check_inputs(x, y, 2)?;

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 {
        return Err(CalibrationError::DegenerateFit {
            reason: "all mean sensor readings are identical".to_string(),
        });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if syy == 0.0 {
        0.0
    } else {
        let r = sxy / (sxx * syy).sqrt();
        r * r
    };

    let coefficients = vec![slope, intercept];
    let rmse = rmse(&coefficients, x, y);
    Ok(FitOutcome {
        coefficients,
        r_squared,
        rmse,
    })
}

/// Least-squares polynomial of `degree`; R² = 1 − SS_res/SS_tot
///
/// Readings are centred and scaled before solving the normal equations, then
/// the coefficients are expanded back to powers of the raw reading.
pub fn polynomial_fit(x: &[f64], y: &[f64], degree: usize) -> Result<FitOutcome, CalibrationError> {
    check_inputs(x, y, degree + 1)?;

    let n = x.len() as f64;
    let center = x.iter().sum::<f64>() / n;
    let scale = x
        .iter()
        .map(|xi| (xi - center).abs())
        .fold(0.0_f64, f64::max);
    if scale == 0.0 {
        return Err(CalibrationError::DegenerateFit {
            reason: "all mean sensor readings are identical".to_string(),
        });
    }

    let t: Vec<f64> = x.iter().map(|xi| (xi - center) / scale).collect();
    let scaled = solve_normal_equations(&t, y, degree)?;
    let ascending = expand_scaled(&scaled, center, scale);
    let coefficients: Vec<f64> = ascending.into_iter().rev().collect();

    let mean_y = y.iter().sum::<f64>() / n;
    let ss_tot: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();
    let ss_res: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - evaluate_polynomial(&coefficients, *xi)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    let rmse = rmse(&coefficients, x, y);
    Ok(FitOutcome {
        coefficients,
        r_squared,
        rmse,
    })
}

/// Root mean squared residual of the curve over the data
pub fn rmse(coefficients: &[f64], x: &[f64], y: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let sum: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - evaluate_polynomial(coefficients, *xi)).powi(2))
        .sum();
    (sum / x.len() as f64).sqrt()
}

fn check_inputs(x: &[f64], y: &[f64], required: usize) -> Result<(), CalibrationError> {
    let collected = x.len().min(y.len());
    if collected < required {
        return Err(CalibrationError::InsufficientData {
            required,
            collected,
        });
    }
    Ok(())
}

/// Solve (AᵀA)c = Aᵀy for ascending-power coefficients
fn solve_normal_equations(t: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>, CalibrationError> {
    let size = degree + 1;

    // Power sums Σ t^k for k in 0..=2·degree
    let mut power_sums = vec![0.0; 2 * degree + 1];
    let mut rhs = vec![0.0; size];
    for (ti, yi) in t.iter().zip(y) {
        let mut p = 1.0;
        for (k, sum) in power_sums.iter_mut().enumerate() {
            *sum += p;
            if k < size {
                rhs[k] += p * yi;
            }
            p *= ti;
        }
    }

    let mut matrix: Vec<Vec<f64>> = (0..size)
        .map(|row| {
            let mut line: Vec<f64> = power_sums[row..row + size].to_vec();
            line.push(rhs[row]);
            line
        })
        .collect();

    gaussian_elimination(&mut matrix)
}

/// Gaussian elimination with partial pivoting on an augmented matrix
fn gaussian_elimination(matrix: &mut [Vec<f64>]) -> Result<Vec<f64>, CalibrationError> {
    let size = matrix.len();

    for col in 0..size {
        let pivot_row = (col..size)
            .max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))
            .unwrap_or(col);
        if matrix[pivot_row][col].abs() < PIVOT_EPSILON {
            return Err(CalibrationError::DegenerateFit {
                reason: "normal equations are singular".to_string(),
            });
        }
        matrix.swap(col, pivot_row);

        for row in (col + 1)..size {
            let factor = matrix[row][col] / matrix[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=size {
                let delta = factor * matrix[col][k];
                matrix[row][k] -= delta;
            }
        }
    }

    let mut solution = vec![0.0; size];
    for row in (0..size).rev() {
        let tail: f64 = ((row + 1)..size)
            .map(|k| matrix[row][k] * solution[k])
            .sum();
        solution[row] = (matrix[row][size] - tail) / matrix[row][row];
    }
    Ok(solution)
}

/// Rewrite Σ d_k·((x − center)/scale)^k as ascending powers of x
fn expand_scaled(scaled: &[f64], center: f64, scale: f64) -> Vec<f64> {
    let mut out = vec![0.0; scaled.len()];
    for (k, d_k) in scaled.iter().enumerate() {
        let factor = d_k / scale.powi(k as i32);
        for (j, slot) in out.iter_mut().enumerate().take(k + 1) {
            *slot += factor * binomial(k, j) * (-center).powi((k - j) as i32);
        }
    }
    out
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}
