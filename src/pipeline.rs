//! File-based drivers for the interpolation and scaling stages.

use crate::builder::StationTimeSeriesBuilder;
use crate::config::{InterpolationConfig, ScalingConfig};
use crate::error::Result;
use crate::grid::GridStore;
use crate::io::{NetCdfReader, NetCdfWriter};
use crate::scaling::{ScalingInputs, ScalingKernelEngine, ScalingReport};
use crate::series::StationSeries;
use crate::station::StationSet;
use crate::variables::DatasetKind;
use crate::vertical::VerticalInterpolator;
use log::info;
use std::path::{Path, PathBuf};

/// Station series written by [`InterpolationPipeline::run`]
#[derive(Debug, Clone, Default)]
pub struct InterpolationOutputs {
    pub invariant: Option<PathBuf>,
    pub surface_analysis: Option<PathBuf>,
    pub surface_forecast: Option<PathBuf>,
    pub pressure_level: Option<PathBuf>,
    /// Pressure-level series collapsed to station elevation
    pub pressure_level_surface: Option<PathBuf>,
}

fn station_file(dir: &Path, source: &str, kind: DatasetKind, list_name: &str) -> PathBuf {
    dir.join(format!("{}_{}_{}.nc", source, kind.prefix(), list_name))
}

fn surface_file(dir: &Path, source: &str, list_name: &str) -> PathBuf {
    dir.join(format!(
        "{}_{}_{}_surface.nc",
        source,
        DatasetKind::PressureLevel.prefix(),
        list_name
    ))
}

/// Interpolates every downloaded dataset in `input_dir` to the stations
pub struct InterpolationPipeline<'a> {
    config: &'a InterpolationConfig,
    stations: &'a StationSet,
    input_dir: PathBuf,
    output_dir: PathBuf,
    list_name: String,
}

impl<'a> InterpolationPipeline<'a> {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        config: &'a InterpolationConfig,
        stations: &'a StationSet,
        input_dir: P,
        output_dir: Q,
        list_name: &str,
    ) -> Self {
        Self {
            config,
            stations,
            input_dir: input_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            list_name: list_name.to_string(),
        }
    }

    fn pattern(&self, kind: DatasetKind) -> String {
        let name = match kind {
            DatasetKind::Invariant => format!("{}_{}.nc", self.config.source, kind.prefix()),
            _ => format!("{}_{}_*.nc", self.config.source, kind.prefix()),
        };
        self.input_dir.join(name).to_string_lossy().into_owned()
    }

    /// Run the to, sa, sf and pl stages in that order, then collapse the
    /// pressure levels onto the station elevations
    pub fn run(&self) -> Result<InterpolationOutputs> {
        self.config.validate()?;
        let builder = StationTimeSeriesBuilder::new(self.config, self.stations)?;
        let mut outputs = InterpolationOutputs::default();

        for kind in [
            DatasetKind::Invariant,
            DatasetKind::SurfaceAnalysis,
            DatasetKind::SurfaceForecast,
            DatasetKind::PressureLevel,
        ] {
            let variables = kind.select(&self.config.variables);
            if variables.is_empty() {
                info!("No {} variables requested, skipping", kind.prefix());
                continue;
            }
            let store = GridStore::open(&self.pattern(kind))?;
            let path = station_file(&self.output_dir, &self.config.source, kind, &self.list_name);
            builder.build(&store, &variables, NetCdfWriter::create(&path)?)?;
            info!("Wrote {}", path.display());

            let slot = match kind {
                DatasetKind::Invariant => &mut outputs.invariant,
                DatasetKind::SurfaceAnalysis => &mut outputs.surface_analysis,
                DatasetKind::SurfaceForecast => &mut outputs.surface_forecast,
                DatasetKind::PressureLevel => &mut outputs.pressure_level,
            };
            *slot = Some(path);
        }

        if let Some(pl) = &outputs.pressure_level {
            let series = StationSeries::load(&NetCdfReader::open(pl)?)?;
            let path = surface_file(&self.output_dir, &self.config.source, &self.list_name);
            VerticalInterpolator::new(self.config).run(&series, NetCdfWriter::create(&path)?)?;
            info!("Wrote {}", path.display());
            outputs.pressure_level_surface = Some(path);
        }
        Ok(outputs)
    }
}

/// Rescales the station series of one station list to a uniform time step
pub struct ScalingPipeline<'a> {
    config: &'a ScalingConfig,
    stations: &'a StationSet,
    input_dir: PathBuf,
    output_dir: PathBuf,
    list_name: String,
}

impl<'a> ScalingPipeline<'a> {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        config: &'a ScalingConfig,
        stations: &'a StationSet,
        input_dir: P,
        output_dir: Q,
        list_name: &str,
    ) -> Self {
        Self {
            config,
            stations,
            input_dir: input_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            list_name: list_name.to_string(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "scaled_{}_{}h.nc",
            self.config.source, self.config.time_step_hours
        ))
    }

    pub fn run(&self) -> Result<(PathBuf, ScalingReport)> {
        let source = &self.config.source;
        let load = |path: PathBuf| -> Result<StationSeries> {
            Ok(StationSeries::load(&NetCdfReader::open(path)?)?)
        };
        let inputs = ScalingInputs::new(
            load(surface_file(&self.input_dir, source, &self.list_name))?,
            load(station_file(&self.input_dir, source, DatasetKind::SurfaceAnalysis, &self.list_name))?,
            load(station_file(&self.input_dir, source, DatasetKind::SurfaceForecast, &self.list_name))?,
            load(station_file(&self.input_dir, source, DatasetKind::Invariant, &self.list_name))?,
        );

        let mut engine = ScalingKernelEngine::new(self.config, self.stations)?;
        let path = self.output_path();
        let (_, report) = engine.run(&inputs, NetCdfWriter::create(&path)?)?;
        info!("Wrote {}", path.display());
        Ok((path, report))
    }
}
