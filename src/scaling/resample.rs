//! Temporal resampling of station series onto the uniform output grid.
//!
//! All times are seconds since 1900-01-01. Arrays are `[time, station]`.

use super::ScalingError;
use crate::math::interp_series;
use ndarray::{Array2, ArrayView2, Axis};

/// Uniform grid from the latest first timestamp to the earliest last
/// timestamp of `axes`, stepping by `step_seconds` and including the last
/// step that fits
pub fn output_time_grid(axes: &[&[f64]], step_seconds: f64) -> Result<Vec<f64>, ScalingError> {
    let mut start = f64::NEG_INFINITY;
    let mut end = f64::INFINITY;
    for axis in axes {
        let (Some(&first), Some(&last)) = (axis.first(), axis.last()) else {
            return Err(ScalingError::NoTimeOverlap);
        };
        start = start.max(first);
        end = end.min(last);
    }
    if axes.is_empty() || end < start || !(step_seconds > 0.0) {
        return Err(ScalingError::NoTimeOverlap);
    }
    let steps = ((end - start) / step_seconds + 1e-9).floor() as usize;
    Ok((0..=steps).map(|k| start + k as f64 * step_seconds).collect())
}

/// Linear interpolation of every station column onto `grid`
pub fn resample_instantaneous(
    times: &[f64],
    values: ArrayView2<f64>,
    grid: &[f64],
) -> Result<Array2<f64>, ScalingError> {
    let stations = values.len_of(Axis(1));
    let mut out = Array2::zeros((grid.len(), stations));
    for (s, column) in values.axis_iter(Axis(1)).enumerate() {
        let column: Vec<f64> = column.to_vec();
        let resampled = interp_series(times, &column, grid)?;
        out.column_mut(s)
            .iter_mut()
            .zip(resampled)
            .for_each(|(o, v)| *o = v);
    }
    Ok(out)
}

/// Index of the accumulation period `(kR, (k+1)R]` containing `t`
fn accumulation_period(t: f64, reset_seconds: f64) -> i64 {
    (t / reset_seconds).ceil() as i64 - 1
}

/// Per-sample totals of a series accumulated since the last reset.
///
/// The total of sample `i` covers the interval since sample `i-1`. A first
/// sample that lies part-way into its period is scaled down to one
/// interval.
pub fn deaccumulate(times: &[f64], values: &[f64], reset_seconds: f64) -> Vec<f64> {
    let mut totals = Vec::with_capacity(values.len());
    for (i, (&t, &v)) in times.iter().zip(values).enumerate() {
        let period = accumulation_period(t, reset_seconds);
        let total = if i == 0 {
            let elapsed = t - period as f64 * reset_seconds;
            let interval = times.get(1).map_or(elapsed, |t1| t1 - t);
            if elapsed > interval && elapsed > 0.0 {
                v * interval / elapsed
            } else {
                v
            }
        } else if accumulation_period(times[i - 1], reset_seconds) == period {
            v - values[i - 1]
        } else {
            v
        };
        totals.push(total);
    }
    totals
}

/// Accumulated series resampled to the amount per output step
pub fn resample_accumulated(
    times: &[f64],
    values: ArrayView2<f64>,
    grid: &[f64],
    reset_seconds: f64,
    step_seconds: f64,
    variable: &str,
) -> Result<Array2<f64>, ScalingError> {
    if times.len() < 2 {
        return Err(ScalingError::InsufficientTimeSteps {
            variable: variable.to_string(),
            found: times.len(),
        });
    }
    let intervals: Vec<f64> = (0..times.len())
        .map(|i| if i == 0 { times[1] - times[0] } else { times[i] - times[i - 1] })
        .collect();

    let mut rates = Array2::zeros(values.raw_dim());
    for (s, column) in values.axis_iter(Axis(1)).enumerate() {
        let column: Vec<f64> = column.to_vec();
        let totals = deaccumulate(times, &column, reset_seconds);
        for (i, total) in totals.into_iter().enumerate() {
            rates[[i, s]] = total / intervals[i];
        }
    }
    let mut out = resample_instantaneous(times, rates.view(), grid)?;
    out.mapv_inplace(|rate| rate * step_seconds);
    Ok(out)
}
