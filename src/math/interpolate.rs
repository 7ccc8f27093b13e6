use num_traits::Float;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("Empty coordinate array")]
    EmptyCoordinates,

    #[error("Coordinates must be strictly increasing (index {0})")]
    NotMonotonic(usize),

    #[error("Length mismatch: {coords} coordinates but {values} values")]
    LengthMismatch { coords: usize, values: usize },

    #[error("Value {value} outside interpolation range [{min}, {max}]")]
    OutOfBounds { value: f64, min: f64, max: f64 },
}

/// Generic linear interpolation between two values
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Locate `target` in ascending `coords`.
///
/// Returns `(left, right, weight)` where `weight` is the fractional distance
/// from `coords[left]` towards `coords[right]`. A target on a node returns
/// that node on both sides so the neighbour never contributes. `None` when
/// the target lies outside the coordinate range.
pub fn find_cell(coords: &[f64], target: f64) -> Option<(usize, usize, f64)> {
    let last = coords.len().checked_sub(1)?;
    if !(target >= coords[0] && target <= coords[last]) {
        return None;
    }

    // Binary search for insertion point
    let mut left = 0;
    let mut right = last;
    while right - left > 1 {
        let mid = (left + right) / 2;
        if coords[mid] <= target {
            left = mid;
        } else {
            right = mid;
        }
    }

    if coords[left] == target {
        return Some((left, left, 0.0));
    }
    if coords[right] == target {
        return Some((right, right, 0.0));
    }
    let weight = (target - coords[left]) / (coords[right] - coords[left]);
    Some((left, right, weight))
}

/// Check that coordinates are non-empty and strictly increasing
pub fn check_monotonic(coords: &[f64]) -> Result<(), InterpolationError> {
    if coords.is_empty() {
        return Err(InterpolationError::EmptyCoordinates);
    }
    match coords.windows(2).position(|w| !(w[1] > w[0])) {
        Some(i) => Err(InterpolationError::NotMonotonic(i + 1)),
        None => Ok(()),
    }
}

/// Piecewise-linear interpolation of the series `(x, y)` at `x_new`.
///
/// `x` must be strictly increasing and every `x_new` must fall inside its
/// range; there is no extrapolation.
pub fn interp_series(x: &[f64], y: &[f64], x_new: &[f64]) -> Result<Vec<f64>, InterpolationError> {
    check_monotonic(x)?;
    if x.len() != y.len() {
        return Err(InterpolationError::LengthMismatch {
            coords: x.len(),
            values: y.len(),
        });
    }

    x_new
        .iter()
        .map(|&xn| {
            let (i0, i1, w) = find_cell(x, xn).ok_or(InterpolationError::OutOfBounds {
                value: xn,
                min: x[0],
                max: x[x.len() - 1],
            })?;
            Ok(if i0 == i1 { y[i0] } else { lin_interp(y[i0], y[i1], w) })
        })
        .collect()
}
