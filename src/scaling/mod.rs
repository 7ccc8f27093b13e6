//! Resampling of station series onto a uniform time step and derivation of
//! model forcing variables through a chain of named kernels.

pub mod kernels;
pub mod resample;

pub use kernels::{Kernel, KernelOutput, KernelRegistry, OutputSpec};
pub use resample::{deaccumulate, output_time_grid, resample_accumulated, resample_instantaneous};

use crate::config::{ConfigurationError, Constants, ScalingConfig};
use crate::io::{AttributeValue, DataType, DataWriter, StoreError, VariableSpec};
use crate::math::InterpolationError;
use crate::series::{OutputGuard, SeriesError, StationSeries};
use crate::station::StationSet;
use crate::time_utils::{seconds_since_1900, OUTPUT_CALENDAR, SCALED_TIME_UNITS};
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;
use thiserror::Error;

/// Written where a kernel produced no finite value
pub const SCALED_FILL_VALUE: f64 = -9999.0;

#[derive(Error, Debug)]
pub enum ScalingError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error("Unknown kernel {0}")]
    UnknownKernel(String),

    #[error("Kernel {kernel} requires {requires}, which must run earlier")]
    KernelOrder { kernel: String, requires: String },

    #[error("Variable {variable} not found in the {source_kind} series")]
    MissingVariable {
        source_kind: SourceKind,
        variable: String,
    },

    #[error("Kernel {kernel} needs {attribute} for station {station}")]
    MissingStationAttribute {
        kernel: String,
        station: i32,
        attribute: &'static str,
    },

    #[error("Accumulated variable {variable} has {found} time step(s), at least 2 are needed")]
    InsufficientTimeSteps { variable: String, found: usize },

    #[error("Input series do not overlap in time")]
    NoTimeOverlap,

    #[error("The {source_kind} series has {found} stations, expected {expected}")]
    StationMismatch {
        source_kind: SourceKind,
        expected: usize,
        found: usize,
    },

    #[error("Kernel {kernel} returned shape {found:?}, expected {expected:?}")]
    OutputShape {
        kernel: String,
        expected: [usize; 2],
        found: Vec<usize>,
    },

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("Writing {output} failed: {source}")]
    Write {
        output: String,
        #[source]
        source: StoreError,
    },
}

/// The four station-series inputs of the scaling stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Pressure-level data interpolated to station elevation
    PressureLevel,
    SurfaceAnalysis,
    SurfaceForecast,
    Invariant,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::PressureLevel => "pl",
            SourceKind::SurfaceAnalysis => "sa",
            SourceKind::SurfaceForecast => "sf",
            SourceKind::Invariant => "to",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct LoadedSource {
    series: StationSeries,
    seconds: Vec<f64>,
}

impl LoadedSource {
    fn new(series: StationSeries) -> Self {
        let seconds = series.times.iter().map(|&t| seconds_since_1900(t)).collect();
        Self { series, seconds }
    }
}

/// Station series read back from the interpolation stage
pub struct ScalingInputs {
    sources: HashMap<SourceKind, LoadedSource>,
}

impl ScalingInputs {
    pub fn new(
        pressure_level: StationSeries,
        surface_analysis: StationSeries,
        surface_forecast: StationSeries,
        invariant: StationSeries,
    ) -> Self {
        let sources = [
            (SourceKind::PressureLevel, pressure_level),
            (SourceKind::SurfaceAnalysis, surface_analysis),
            (SourceKind::SurfaceForecast, surface_forecast),
            (SourceKind::Invariant, invariant),
        ]
        .into_iter()
        .map(|(kind, series)| (kind, LoadedSource::new(series)))
        .collect();
        Self { sources }
    }

    fn source(&self, kind: SourceKind) -> &LoadedSource {
        // all four kinds are inserted by `new`
        &self.sources[&kind]
    }

    pub fn series(&self, kind: SourceKind) -> &StationSeries {
        &self.source(kind).series
    }

    fn check_stations(&self, expected: usize) -> Result<(), ScalingError> {
        for (&kind, source) in &self.sources {
            let found = source.series.stations.len();
            if found != expected {
                return Err(ScalingError::StationMismatch {
                    source_kind: kind,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Output grid over the overlap of the time-varying inputs
    pub fn time_grid(&self, step_seconds: f64) -> Result<Vec<f64>, ScalingError> {
        let axes: Vec<&[f64]> = [
            SourceKind::PressureLevel,
            SourceKind::SurfaceAnalysis,
            SourceKind::SurfaceForecast,
        ]
        .iter()
        .map(|&k| self.source(k).seconds.as_slice())
        .collect();
        output_time_grid(&axes, step_seconds)
    }
}

/// What a kernel sees: resampled inputs, earlier outputs and station data
pub struct KernelContext<'a> {
    kernel: &'a str,
    inputs: &'a ScalingInputs,
    grid: &'a [f64],
    config: &'a ScalingConfig,
    stations: &'a StationSet,
    outputs: &'a HashMap<String, Array2<f64>>,
}

impl<'a> KernelContext<'a> {
    /// Output time grid, seconds since 1900-01-01
    pub fn grid(&self) -> &[f64] {
        self.grid
    }

    pub fn step_seconds(&self) -> f64 {
        self.config.time_step_seconds()
    }

    pub fn constants(&self) -> &Constants {
        &self.config.constants
    }

    pub fn stations(&self) -> &StationSet {
        self.stations
    }

    fn raw(&self, kind: SourceKind, variable: &str) -> Result<(&[f64], Array2<f64>), ScalingError> {
        let source = self.inputs.source(kind);
        let values = source
            .series
            .surface(variable)
            .map_err(|_| ScalingError::MissingVariable {
                source_kind: kind,
                variable: variable.to_string(),
            })?;
        Ok((&source.seconds, values))
    }

    /// Instantaneous input linearly interpolated to the output grid
    pub fn instantaneous(&self, kind: SourceKind, variable: &str) -> Result<Array2<f64>, ScalingError> {
        let (times, values) = self.raw(kind, variable)?;
        resample_instantaneous(times, values.view(), self.grid)
    }

    /// Accumulated input as amount per output step
    pub fn accumulated(&self, kind: SourceKind, variable: &str) -> Result<Array2<f64>, ScalingError> {
        let (times, values) = self.raw(kind, variable)?;
        resample_accumulated(
            times,
            values.view(),
            self.grid,
            self.config.accumulation_reset_hours * 3600.0,
            self.step_seconds(),
            variable,
        )
    }

    /// Output of an earlier kernel
    pub fn output(&self, kernel: &str) -> Result<&Array2<f64>, ScalingError> {
        self.outputs
            .get(kernel)
            .ok_or_else(|| ScalingError::KernelOrder {
                kernel: self.kernel.to_string(),
                requires: kernel.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Configured,
    SchemaOpen,
    RunKernel,
    Closed,
}

/// Result of a scaling run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingReport {
    /// Output variable names in kernel order
    pub produced: Vec<String>,
    /// Kernels that ran as no-ops, with the reason
    pub noop: Vec<(String, String)>,
    pub time_steps: usize,
}

/// Runs the configured kernels over one set of station inputs.
pub struct ScalingKernelEngine<'a> {
    config: &'a ScalingConfig,
    stations: &'a StationSet,
    kernels: Vec<Box<dyn Kernel>>,
    state: EngineState,
}

impl<'a> ScalingKernelEngine<'a> {
    pub fn new(config: &'a ScalingConfig, stations: &'a StationSet) -> Result<Self, ScalingError> {
        Self::with_registry(config, stations, &KernelRegistry::standard())
    }

    pub fn with_registry(
        config: &'a ScalingConfig,
        stations: &'a StationSet,
        registry: &KernelRegistry,
    ) -> Result<Self, ScalingError> {
        config.validate()?;
        let kernels = registry.resolve(&config.kernels, &config.label)?;
        Ok(Self {
            config,
            stations,
            kernels,
            state: EngineState::Configured,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Kernel identifiers in execution order, aliases expanded
    pub fn kernel_names(&self) -> Vec<&str> {
        self.kernels.iter().map(|k| k.name()).collect()
    }

    /// Resample, run every kernel and write the results. The output is
    /// discarded if any step fails.
    pub fn run<W: DataWriter>(
        &mut self,
        inputs: &ScalingInputs,
        writer: W,
    ) -> Result<(W, ScalingReport), ScalingError> {
        let mut guard = OutputGuard::new(writer);
        let output_name = guard.identifier();
        let write_err = |source: StoreError| ScalingError::Write {
            output: output_name.clone(),
            source,
        };

        inputs.check_stations(self.stations.len())?;
        let grid = inputs.time_grid(self.config.time_step_seconds())?;
        info!(
            "Scaling {} stations onto {} steps of {} h",
            self.stations.len(),
            grid.len(),
            self.config.time_step_hours
        );

        self.write_schema(guard.writer().map_err(write_err)?, &grid)
            .map_err(write_err)?;
        self.state = EngineState::SchemaOpen;

        let mut report = ScalingReport {
            time_steps: grid.len(),
            ..Default::default()
        };
        let mut outputs: HashMap<String, Array2<f64>> = HashMap::new();
        for kernel in &self.kernels {
            self.state = EngineState::RunKernel;
            let ctx = KernelContext {
                kernel: kernel.name(),
                inputs,
                grid: &grid,
                config: self.config,
                stations: self.stations,
                outputs: &outputs,
            };
            match kernel.compute(&ctx)? {
                KernelOutput::NoOp { reason } => {
                    warn!("Kernel {} did nothing: {}", kernel.name(), reason);
                    report.noop.push((kernel.name().to_string(), reason));
                }
                KernelOutput::Series(values) => {
                    let expected = [grid.len(), self.stations.len()];
                    if values.shape() != expected {
                        return Err(ScalingError::OutputShape {
                            kernel: kernel.name().to_string(),
                            expected,
                            found: values.shape().to_vec(),
                        });
                    }
                    if let Some(spec) = kernel.output() {
                        write_output(guard.writer().map_err(write_err)?, spec, &values)
                            .map_err(write_err)?;
                        report.produced.push(spec.name.clone());
                    }
                    debug!("Kernel {} done", kernel.name());
                    outputs.insert(kernel.name().to_string(), values);
                }
            }
        }

        let writer = guard.commit().map_err(write_err)?;
        self.state = EngineState::Closed;
        info!(
            "Wrote {} variables to {} ({} no-op kernels)",
            report.produced.len(),
            output_name,
            report.noop.len()
        );
        Ok((writer, report))
    }

    fn write_schema<W: DataWriter>(&self, writer: &mut W, grid: &[f64]) -> Result<(), StoreError> {
        writer.add_dimension("time", None)?;
        writer.add_dimension("station", Some(self.stations.len()))?;

        writer.add_variable(
            &VariableSpec::new("time", &["time"], DataType::Double)
                .with_attribute("long_name", "time")
                .with_attribute("units", SCALED_TIME_UNITS)
                .with_attribute("calendar", OUTPUT_CALENDAR),
        )?;
        writer.add_variable(
            &VariableSpec::new("station", &["station"], DataType::Int)
                .with_attribute("long_name", "station for time series data"),
        )?;
        writer.add_variable(
            &VariableSpec::new("station_name", &["station"], DataType::Text)
                .with_attribute("long_name", "station name"),
        )?;
        for (name, units) in [
            ("latitude", "degrees_north"),
            ("longitude", "degrees_east"),
            ("height", "m"),
        ] {
            writer.add_variable(
                &VariableSpec::new(name, &["station"], DataType::Float)
                    .with_attribute("standard_name", name)
                    .with_attribute("units", units),
            )?;
        }
        writer.put_global_attribute("Conventions", AttributeValue::from("CF-1.6"))?;
        writer.put_global_attribute("featureType", AttributeValue::from("timeSeries"))?;
        writer.put_global_attribute("source", AttributeValue::from(self.config.source.as_str()))?;

        writer.put_values("time", &[0], ArrayView1::from(grid).into_dyn())?;
        for (name, values) in [
            ("station", self.stations.ids()),
            ("latitude", self.stations.latitudes()),
            ("longitude", self.stations.longitudes()),
            ("height", self.stations.elevations()),
        ] {
            writer.put_values(name, &[0], ArrayView1::from(values.as_slice()).into_dyn())?;
        }
        writer.put_strings("station_name", &self.stations.names())
    }
}

fn write_output<W: DataWriter>(
    writer: &mut W,
    spec: &OutputSpec,
    values: &Array2<f64>,
) -> Result<(), StoreError> {
    writer.add_variable(
        &VariableSpec::new(&spec.name, &["time", "station"], DataType::Float)
            .with_attribute("long_name", spec.long_name.as_str())
            .with_attribute("units", spec.units.as_str())
            .with_attribute("standard_name", spec.standard_name.as_str())
            .with_attribute("_FillValue", SCALED_FILL_VALUE),
    )?;
    let filled = values.mapv(|v| if v.is_finite() { v } else { SCALED_FILL_VALUE });
    writer.put_values(&spec.name, &[0, 0], filled.view().into_dyn())
}
