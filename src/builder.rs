use crate::config::{ConfigurationError, InterpolationConfig};
use crate::grid::{GridError, GridStore};
use crate::io::{DataWriter, StoreError};
use crate::math::pressure_levels_for_elevations;
use crate::regrid::{RegridError, SourceMesh, SpatialRegridder};
use crate::series::{SeriesSchema, StationCoordinates, StationSeriesStore, VariableMeta};
use crate::station::StationSet;
use log::{debug, info, warn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Regrid(#[from] RegridError),

    #[error("Interpolating chunk {chunk} of {fileset} failed: {source}")]
    Chunk {
        fileset: String,
        chunk: usize,
        #[source]
        source: RegridError,
    },

    #[error("Writing {output} from {fileset} failed: {source}")]
    Write {
        fileset: String,
        output: String,
        #[source]
        source: StoreError,
    },
}

/// A contiguous run of selected time steps, as positions into the list of
/// selected global time indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeChunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl TimeChunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `len` selected steps into chunks of at most `chunk_size`
pub fn partition_chunks(len: usize, chunk_size: usize) -> Vec<TimeChunk> {
    let chunk_size = chunk_size.max(1);
    (0..len.div_ceil(chunk_size))
        .map(|index| TimeChunk {
            index,
            start: index * chunk_size,
            end: ((index + 1) * chunk_size).min(len),
        })
        .collect()
}

/// Drives regridding of one gridded dataset into one station series output,
/// chunk by chunk along time.
pub struct StationTimeSeriesBuilder<'a> {
    config: &'a InterpolationConfig,
    stations: &'a StationSet,
}

impl<'a> StationTimeSeriesBuilder<'a> {
    pub fn new(config: &'a InterpolationConfig, stations: &'a StationSet) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self { config, stations })
    }

    /// Interpolate `variables` of `store` to the stations and write them to
    /// `writer`. On any error the output is discarded.
    pub fn build<W: DataWriter>(
        &self,
        store: &GridStore,
        variables: &[String],
        writer: W,
    ) -> Result<W, BuildError> {
        let mut output = StationSeriesStore::new(writer);
        let fileset = store.identifier().to_string();
        let output_name = output.identifier();
        let write_err = |source: StoreError| BuildError::Write {
            fileset: fileset.clone(),
            output: output_name.clone(),
            source,
        };

        let mut metas = Vec::with_capacity(variables.len());
        for name in variables {
            let (long_name, units) = store.variable_metadata(name)?;
            metas.push(VariableMeta::new(name, long_name, units));
        }

        // invariant fields have a single step whatever the requested window
        let selected: Vec<usize> = if store.is_invariant() {
            vec![0]
        } else {
            store
                .select_window(self.config.window.as_ref())?
                .iter()
                .enumerate()
                .filter_map(|(i, &m)| m.then_some(i))
                .collect()
        };

        if let (Some(levels), Some((lowest, highest))) = (store.levels(), self.stations.elevation_range()) {
            let missing: Vec<f64> = pressure_levels_for_elevations(lowest, highest, &self.config.constants)
                .into_iter()
                .filter(|p| !levels.iter().any(|l| (l - p).abs() < 1e-6))
                .collect();
            if !missing.is_empty() {
                warn!(
                    "{} lacks pressure levels {:?} hPa for stations between {} and {} m",
                    fileset, missing, lowest, highest
                );
            }
        }

        let mesh = SourceMesh::from_store(store)?;
        let regridder = SpatialRegridder::new(
            mesh,
            self.stations,
            self.config.unmapped_policy,
            self.config.fill_value,
        )?;

        output
            .create_schema(
                &StationCoordinates::from(self.stations),
                SeriesSchema {
                    levels: store.levels().map(<[f64]>::to_vec),
                    variables: metas,
                    source: self.config.source.clone(),
                    fill_value: self.config.fill_value,
                },
            )
            .map_err(write_err)?;

        let chunks = partition_chunks(selected.len(), self.config.chunk_size);
        info!(
            "Interpolating {} of {} to {} stations: {} steps in {} chunk(s)",
            variables.join(","),
            fileset,
            self.stations.len(),
            selected.len(),
            chunks.len()
        );

        let mut mask = vec![false; store.times().len()];
        for chunk in &chunks {
            mask.iter_mut().for_each(|m| *m = false);
            for &i in &selected[chunk.start..chunk.end] {
                mask[i] = true;
            }
            let result = regridder
                .regrid(store, &mask, variables)
                .map_err(|source| BuildError::Chunk {
                    fileset: fileset.clone(),
                    chunk: chunk.index,
                    source,
                })?;
            let times: Vec<_> = result.time_indices.iter().map(|&i| store.times()[i]).collect();
            let fields: Vec<(&str, &ndarray::Array3<f64>)> = result
                .variables
                .iter()
                .map(String::as_str)
                .zip(result.fields.iter())
                .collect();
            output.append(&times, &fields).map_err(write_err)?;
            debug!("Chunk {} of {} done ({} steps)", chunk.index, fileset, chunk.len());
        }

        output.finish().map_err(write_err)
    }
}
