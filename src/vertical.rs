use crate::config::{Constants, InterpolationConfig};
use crate::io::{DataWriter, StoreError};
use crate::math::geopotential_height;
use crate::series::{SeriesError, SeriesSchema, StationSeries, StationSeriesStore, VariableMeta};
use log::{debug, info, warn};
use ndarray::Array3;
use thiserror::Error;

/// Geopotential variable used to locate the pressure levels in height
pub const GEOPOTENTIAL: &str = "z";
/// Interpolated pressure added to the surface output
pub const AIR_PRESSURE: &str = "air_pressure";

#[derive(Error, Debug)]
pub enum VerticalError {
    #[error("Variable {variable} not found in {dataset}")]
    MissingVariable { dataset: String, variable: String },

    #[error("{dataset} has no pressure levels")]
    NotPressureLevel { dataset: String },

    #[error("No level to bracket stations in {dataset}: empty level axis")]
    NoBracketingLevel { dataset: String },

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("Writing {output} failed: {source}")]
    Write {
        output: String,
        #[source]
        source: StoreError,
    },
}

/// Two levels around a station and their weights; `above == below` when
/// the station lies outside the column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelBracket {
    pub above: usize,
    pub below: usize,
    pub w_above: f64,
    pub w_below: f64,
}

impl LevelBracket {
    fn single(level: usize) -> Self {
        Self {
            above: level,
            below: level,
            w_above: 1.0,
            w_below: 0.0,
        }
    }

    pub fn apply(&self, value_above: f64, value_below: f64) -> f64 {
        if self.w_below == 0.0 {
            value_above
        } else {
            self.w_above * value_above + self.w_below * value_below
        }
    }
}

/// Find the levels around `elevation` given the height (m) of every level.
///
/// Stations above the highest level use the highest level, stations below
/// the lowest level use the lowest level. Returns `None` when no level has
/// a finite height.
pub fn level_bracket(heights: &[f64], elevation: f64) -> Option<LevelBracket> {
    let finite = || heights.iter().copied().enumerate().filter(|(_, h)| h.is_finite());

    let above = finite()
        .filter(|&(_, h)| h >= elevation)
        .min_by(|a, b| a.1.total_cmp(&b.1));
    let below = finite()
        .filter(|&(_, h)| h < elevation)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    match (above, below) {
        (Some((ia, ha)), Some((ib, hb))) => {
            let d_above = (ha - elevation).abs();
            let d_below = (elevation - hb).abs();
            let total = d_above + d_below;
            if total == 0.0 || d_above == 0.0 {
                return Some(LevelBracket::single(ia));
            }
            let w_above = d_below / total;
            Some(LevelBracket {
                above: ia,
                below: ib,
                w_above,
                w_below: 1.0 - w_above,
            })
        }
        (Some((ia, _)), None) => Some(LevelBracket::single(ia)),
        (None, Some(_)) => {
            // above the top of the column: clamp to the highest level
            let top = finite().max_by(|a, b| a.1.total_cmp(&b.1))?;
            Some(LevelBracket::single(top.0))
        }
        (None, None) => None,
    }
}

/// Collapses pressure-level station series onto each station's elevation.
pub struct VerticalInterpolator {
    constants: Constants,
    fill_value: f64,
    source: String,
}

impl VerticalInterpolator {
    pub fn new(config: &InterpolationConfig) -> Self {
        Self {
            constants: config.constants.clone(),
            fill_value: config.fill_value,
            source: config.source.clone(),
        }
    }

    /// Brackets for every `(time, station)` of the series; `None` where the
    /// station column has no finite height, e.g. stations outside the grid
    pub fn brackets(
        &self,
        input: &StationSeries,
    ) -> Result<ndarray::Array2<Option<LevelBracket>>, VerticalError> {
        let dataset = input.identifier.clone();
        match &input.levels {
            None => return Err(VerticalError::NotPressureLevel { dataset }),
            Some(levels) if levels.is_empty() => {
                return Err(VerticalError::NoBracketingLevel { dataset })
            }
            Some(_) => {}
        }
        let z = &input
            .variable(GEOPOTENTIAL)
            .map_err(|_| VerticalError::MissingVariable {
                dataset: dataset.clone(),
                variable: GEOPOTENTIAL.to_string(),
            })?
            .data;

        let (nt, nl, ns) = z.dim();
        let mut brackets = ndarray::Array2::from_elem((nt, ns), None);
        let mut heights = vec![0.0; nl];
        let mut missing = 0;
        for t in 0..nt {
            for s in 0..ns {
                for (l, h) in heights.iter_mut().enumerate() {
                    *h = geopotential_height(z[[t, l, s]], &self.constants);
                }
                brackets[[t, s]] = level_bracket(&heights, input.stations.heights[s]);
                if brackets[[t, s]].is_none() {
                    missing += 1;
                }
            }
        }
        if missing > 0 {
            warn!(
                "{} of {} station steps in {} have no valid geopotential and are filled",
                missing,
                nt * ns,
                dataset
            );
        }
        Ok(brackets)
    }

    /// Interpolate every variable of `input` except the geopotential to the
    /// station elevations and write a surface series with an added
    /// `air_pressure` (hPa) to `writer`.
    pub fn run<W: DataWriter>(&self, input: &StationSeries, writer: W) -> Result<W, VerticalError> {
        let mut output = StationSeriesStore::new(writer);
        let output_name = output.identifier();
        let write_err = |source: StoreError| VerticalError::Write {
            output: output_name.clone(),
            source,
        };

        let brackets = self.brackets(input)?;
        let levels = input.levels.as_deref().unwrap_or_default();
        let (nt, ns) = brackets.dim();

        let mut names = Vec::new();
        let mut fields = Vec::new();
        let mut metas = Vec::new();
        for variable in input.variables.iter().filter(|v| v.meta.name != GEOPOTENTIAL) {
            let data = &variable.data;
            let field = Array3::from_shape_fn((nt, 1, ns), |(t, _, s)| {
                brackets[[t, s]].map_or(f64::NAN, |b| {
                    b.apply(data[[t, b.above, s]], data[[t, b.below, s]])
                })
            });
            names.push(variable.meta.name.clone());
            metas.push(variable.meta.clone());
            fields.push(field);
        }
        let pressure = Array3::from_shape_fn((nt, 1, ns), |(t, _, s)| {
            brackets[[t, s]].map_or(f64::NAN, |b| b.apply(levels[b.above], levels[b.below]))
        });
        names.push(AIR_PRESSURE.to_string());
        metas.push(VariableMeta::new(
            AIR_PRESSURE,
            Some(AIR_PRESSURE.to_string()),
            Some("hPa".to_string()),
        ));
        fields.push(pressure);

        output
            .create_schema(
                &input.stations,
                SeriesSchema {
                    levels: None,
                    variables: metas,
                    source: self.source.clone(),
                    fill_value: self.fill_value,
                },
            )
            .map_err(write_err)?;
        let pairs: Vec<(&str, &Array3<f64>)> =
            names.iter().map(String::as_str).zip(fields.iter()).collect();
        output.append(&input.times, &pairs).map_err(write_err)?;
        debug!("Collapsed {} variables of {}", names.len(), input.identifier);

        let writer = output.finish().map_err(write_err)?;
        info!("Interpolated {} to station elevations", input.identifier);
        Ok(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::hours;
    use crate::io::MemoryDataset;
    use crate::series::{SeriesVariable, StationCoordinates};
    use approx::assert_relative_eq;
    use ndarray::Axis;

    #[test]
    fn test_bracket_between_levels() {
        // heights for 700, 850, 1000 hPa
        let heights = [3000.0, 1500.0, 100.0];
        let b = level_bracket(&heights, 2000.0).unwrap();
        assert_eq!((b.above, b.below), (0, 1));
        assert_relative_eq!(b.w_above + b.w_below, 1.0);
        assert_relative_eq!(b.w_above, 500.0 / 1500.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bracket_exact_level() {
        let b = level_bracket(&[3000.0, 1500.0, 100.0], 1500.0).unwrap();
        assert_eq!(b, LevelBracket::single(1));
    }

    #[test]
    fn test_bracket_clamps_outside_column() {
        let heights = [3000.0, 1500.0, 100.0];
        assert_eq!(level_bracket(&heights, 50.0).unwrap(), LevelBracket::single(2));
        assert_eq!(level_bracket(&heights, 4000.0).unwrap(), LevelBracket::single(0));
        assert_eq!(level_bracket(&[f64::NAN], 10.0), None);
    }

    fn pressure_series() -> StationSeries {
        let g = Constants::default().gravity;
        // two levels: 700 hPa at 3000 m, 850 hPa at 1500 m
        let z = Array3::from_shape_fn((2, 2, 2), |(_, l, _)| if l == 0 { 3000.0 * g } else { 1500.0 * g });
        let t = Array3::from_shape_fn((2, 2, 2), |(time, l, _)| {
            if l == 0 { 260.0 + time as f64 } else { 275.0 + time as f64 }
        });
        StationSeries {
            identifier: "erai_pl".to_string(),
            times: vec![hours(0.0), hours(6.0)],
            stations: StationCoordinates {
                ids: vec![1.0, 2.0],
                latitudes: vec![46.0, 46.5],
                longitudes: vec![8.0, 9.0],
                heights: vec![2000.0, 1000.0],
            },
            levels: Some(vec![700.0, 850.0]),
            variables: vec![
                SeriesVariable {
                    meta: VariableMeta::new("t", None, Some("K".to_string())),
                    data: t,
                },
                SeriesVariable {
                    meta: VariableMeta::new("z", None, None),
                    data: z,
                },
            ],
        }
    }

    #[test]
    fn test_run_collapses_levels() {
        let interpolator = VerticalInterpolator::new(&InterpolationConfig::default());
        let ds = interpolator
            .run(&pressure_series(), MemoryDataset::new("surface"))
            .unwrap();

        let out = StationSeries::load(&ds).unwrap();
        assert!(out.levels.is_none());
        assert!(out.variable("z").is_err());

        let t = out.surface("t").unwrap();
        // station 0 at 2000 m: one third of the way from 850 to 700 hPa
        assert_relative_eq!(t[[0, 0]], 275.0 - 15.0 / 3.0, epsilon = 1e-9);
        // station 1 below the lowest level takes the 850 hPa value
        assert_relative_eq!(t[[1, 1]], 276.0, epsilon = 1e-9);

        let p = out.surface(AIR_PRESSURE).unwrap();
        assert_relative_eq!(p[[0, 0]], 850.0 - 150.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(p[[0, 1]], 850.0, epsilon = 1e-9);
    }

    #[test]
    fn test_station_without_column_is_filled() {
        // station 1 lies outside the grid, its column reads back as NaN
        let mut series = pressure_series();
        for variable in series.variables.iter_mut() {
            variable.data.index_axis_mut(Axis(2), 1).fill(f64::NAN);
        }
        let interpolator = VerticalInterpolator::new(&InterpolationConfig::default());
        let brackets = interpolator.brackets(&series).unwrap();
        assert!(brackets.column(1).iter().all(Option::is_none));
        assert!(brackets.column(0).iter().all(Option::is_some));

        let ds = interpolator
            .run(&series, MemoryDataset::new("surface"))
            .unwrap();
        assert_eq!(ds.variable_data("t").unwrap()[[0, 1]], -9999.0);
        let out = StationSeries::load(&ds).unwrap();
        let t = out.surface("t").unwrap();
        let p = out.surface(AIR_PRESSURE).unwrap();
        assert!(t.column(1).iter().all(|v| v.is_nan()));
        assert!(p.column(1).iter().all(|v| v.is_nan()));
        assert_relative_eq!(t[[0, 0]], 275.0 - 15.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_level_axis() {
        let mut series = pressure_series();
        series.levels = Some(Vec::new());
        let interpolator = VerticalInterpolator::new(&InterpolationConfig::default());
        assert!(matches!(
            interpolator.run(&series, MemoryDataset::new("surface")),
            Err(VerticalError::NoBracketingLevel { .. })
        ));
    }

    #[test]
    fn test_missing_geopotential() {
        let mut series = pressure_series();
        series.variables.retain(|v| v.meta.name != "z");
        let interpolator = VerticalInterpolator::new(&InterpolationConfig::default());
        let mut out = MemoryDataset::new("surface");
        let result = interpolator.run(&series, &mut out);
        assert!(matches!(result, Err(VerticalError::MissingVariable { .. })));
        assert!(out.is_discarded());
    }
}
