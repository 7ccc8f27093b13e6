use crate::io::{AttributeValue, DataReader, DataType, DataWriter, StoreError, VariableSpec};
use crate::station::StationSet;
use crate::time_utils::{TimeEncoding, TimeError, OUTPUT_CALENDAR, STATION_TIME_UNITS};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use ndarray::{Array2, Array3, ArrayView1, Axis, Ix2, Ix3};
use thiserror::Error;

pub const TIME_DIM: &str = "time";
pub const STATION_DIM: &str = "station";
pub const LEVEL_DIM: &str = "level";

#[derive(Error, Debug)]
pub enum SeriesError {
    #[error("Store error in {dataset}: {source}")]
    Store {
        dataset: String,
        #[source]
        source: StoreError,
    },

    #[error("Time axis error in {dataset}: {source}")]
    Time {
        dataset: String,
        #[source]
        source: TimeError,
    },

    #[error("Variable {variable} not found in {dataset}")]
    MissingVariable { dataset: String, variable: String },

    #[error("Unexpected layout of {variable} in {dataset}: {reason}")]
    Layout {
        dataset: String,
        variable: String,
        reason: String,
    },
}

/// Owns a writer until the output is committed. Dropping an uncommitted
/// guard discards everything written through it.
pub struct OutputGuard<W: DataWriter> {
    writer: Option<W>,
}

impl<W: DataWriter> OutputGuard<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    pub fn identifier(&self) -> String {
        self.writer
            .as_ref()
            .map(|w| w.identifier())
            .unwrap_or_default()
    }

    pub fn writer(&mut self) -> Result<&mut W, StoreError> {
        self.writer
            .as_mut()
            .ok_or_else(|| StoreError::UnsupportedOperation("output already committed".to_string()))
    }

    /// Flush and hand back the writer; the output is kept from now on
    pub fn commit(mut self) -> Result<W, StoreError> {
        let mut writer = self.writer.take().ok_or_else(|| {
            StoreError::UnsupportedOperation("output already committed".to_string())
        })?;
        if let Err(e) = writer.sync() {
            let _ = writer.discard();
            return Err(e);
        }
        Ok(writer)
    }
}

impl<W: DataWriter> Drop for OutputGuard<W> {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            warn!("Discarding incomplete output {}", writer.identifier());
            if let Err(e) = writer.discard() {
                warn!("Failed to discard {}: {}", writer.identifier(), e);
            }
        }
    }
}

/// Station coordinates as stored alongside every station series
#[derive(Debug, Clone, PartialEq)]
pub struct StationCoordinates {
    pub ids: Vec<f64>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub heights: Vec<f64>,
}

impl StationCoordinates {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<&StationSet> for StationCoordinates {
    fn from(stations: &StationSet) -> Self {
        Self {
            ids: stations.ids(),
            latitudes: stations.latitudes(),
            longitudes: stations.longitudes(),
            heights: stations.elevations(),
        }
    }
}

/// Descriptive metadata copied from a source variable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableMeta {
    pub name: String,
    pub long_name: Option<String>,
    pub units: Option<String>,
}

impl VariableMeta {
    pub fn new(name: &str, long_name: Option<String>, units: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            long_name,
            units,
        }
    }
}

/// Layout of a station series dataset
#[derive(Debug, Clone)]
pub struct SeriesSchema {
    /// Pressure levels (hPa); `None` for surface data
    pub levels: Option<Vec<f64>>,
    pub variables: Vec<VariableMeta>,
    /// Value of the `source` global attribute
    pub source: String,
    pub fill_value: f64,
}

/// Append-only station time series output.
///
/// The schema is declared once; chunks are then appended along the unlimited
/// time axis. If the store is dropped before [`StationSeriesStore::finish`],
/// the partial output is discarded.
pub struct StationSeriesStore<W: DataWriter> {
    guard: OutputGuard<W>,
    schema: Option<SeriesSchema>,
    stations: usize,
    cursor: usize,
}

impl<W: DataWriter> StationSeriesStore<W> {
    pub fn new(writer: W) -> Self {
        Self {
            guard: OutputGuard::new(writer),
            schema: None,
            stations: 0,
            cursor: 0,
        }
    }

    pub fn identifier(&self) -> String {
        self.guard.identifier()
    }

    /// Number of time steps appended so far
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Declare dimensions and variables and write the station coordinates
    pub fn create_schema(
        &mut self,
        stations: &StationCoordinates,
        schema: SeriesSchema,
    ) -> Result<(), StoreError> {
        if self.schema.is_some() {
            return Err(StoreError::UnsupportedOperation(format!(
                "schema of {} already created",
                self.identifier()
            )));
        }
        let fill = schema.fill_value;
        let writer = self.guard.writer()?;

        writer.add_dimension(TIME_DIM, None)?;
        writer.add_dimension(STATION_DIM, Some(stations.len()))?;
        if let Some(levels) = &schema.levels {
            writer.add_dimension(LEVEL_DIM, Some(levels.len()))?;
        }

        writer.add_variable(
            &VariableSpec::new(TIME_DIM, &[TIME_DIM], DataType::Double)
                .with_attribute("units", STATION_TIME_UNITS)
                .with_attribute("calendar", OUTPUT_CALENDAR)
                .with_attribute("standard_name", "time"),
        )?;
        writer.add_variable(
            &VariableSpec::new(STATION_DIM, &[STATION_DIM], DataType::Int)
                .with_attribute("long_name", "station"),
        )?;
        writer.add_variable(
            &VariableSpec::new("latitude", &[STATION_DIM], DataType::Float)
                .with_attribute("standard_name", "latitude")
                .with_attribute("long_name", "latitude")
                .with_attribute("units", "degrees_north"),
        )?;
        writer.add_variable(
            &VariableSpec::new("longitude", &[STATION_DIM], DataType::Float)
                .with_attribute("standard_name", "longitude")
                .with_attribute("long_name", "longitude")
                .with_attribute("units", "degrees_east"),
        )?;
        writer.add_variable(
            &VariableSpec::new("height", &[STATION_DIM], DataType::Float)
                .with_attribute("standard_name", "height")
                .with_attribute("long_name", "height_above_reference_ellipsoid")
                .with_attribute("units", "m"),
        )?;
        if schema.levels.is_some() {
            writer.add_variable(
                &VariableSpec::new(LEVEL_DIM, &[LEVEL_DIM], DataType::Int)
                    .with_attribute("long_name", "pressure_level")
                    .with_attribute("units", "hPa"),
            )?;
        }

        let data_dims: &[&str] = if schema.levels.is_some() {
            &[TIME_DIM, LEVEL_DIM, STATION_DIM]
        } else {
            &[TIME_DIM, STATION_DIM]
        };
        for meta in &schema.variables {
            let mut spec = VariableSpec::new(&meta.name, data_dims, DataType::Float)
                .with_attribute("_FillValue", fill)
                .with_attribute("missing_value", fill);
            if let Some(long_name) = &meta.long_name {
                spec = spec.with_attribute("long_name", long_name.as_str());
            }
            if let Some(units) = &meta.units {
                spec = spec.with_attribute("units", units.as_str());
            }
            writer.add_variable(&spec)?;
        }

        writer.put_global_attribute("Conventions", AttributeValue::from("CF-1.6"))?;
        writer.put_global_attribute("source", AttributeValue::from(schema.source.as_str()))?;
        writer.put_global_attribute("featureType", AttributeValue::from("timeSeries"))?;

        let put_1d = |writer: &mut W, name: &str, values: &[f64]| {
            writer.put_values(name, &[0], ArrayView1::from(values).into_dyn())
        };
        put_1d(writer, STATION_DIM, &stations.ids)?;
        put_1d(writer, "latitude", &stations.latitudes)?;
        put_1d(writer, "longitude", &stations.longitudes)?;
        put_1d(writer, "height", &stations.heights)?;
        if let Some(levels) = &schema.levels {
            put_1d(writer, LEVEL_DIM, levels)?;
        }

        debug!(
            "Created station schema in {} with {} variables",
            writer.identifier(),
            schema.variables.len()
        );
        self.stations = stations.len();
        self.schema = Some(schema);
        Ok(())
    }

    /// Append one chunk: timestamps plus one `[time, level, station]` array
    /// per schema variable, in schema order
    pub fn append(
        &mut self,
        times: &[NaiveDateTime],
        fields: &[(&str, &Array3<f64>)],
    ) -> Result<(), StoreError> {
        let identifier = self.identifier();
        let schema = self.schema.as_ref().ok_or_else(|| {
            StoreError::UnsupportedOperation(format!("schema of {} not created", identifier))
        })?;
        let has_levels = schema.levels.is_some();
        let n_levels = schema.levels.as_ref().map_or(1, Vec::len);
        let expected = [times.len(), n_levels, self.stations];
        for (name, field) in fields {
            if !schema.variables.iter().any(|v| v.name == *name) {
                return Err(StoreError::MissingVariable(name.to_string()));
            }
            if field.shape() != expected {
                return Err(StoreError::ShapeMismatch {
                    variable: name.to_string(),
                    expected: expected.to_vec(),
                    found: field.shape().to_vec(),
                });
            }
        }

        let encoding = station_time_encoding()?;
        let raw: Vec<f64> = times.iter().map(|&t| encoding.encode(t)).collect();
        let offset = self.cursor;
        let writer = self.guard.writer()?;
        writer.put_values(
            TIME_DIM,
            &[offset],
            ArrayView1::from(raw.as_slice()).into_dyn(),
        )?;
        let fill = schema.fill_value;
        for (name, field) in fields {
            let filled = field.mapv(|v| if v.is_finite() { v } else { fill });
            if has_levels {
                writer.put_values(name, &[offset, 0, 0], filled.view().into_dyn())?;
            } else {
                let surface = filled.index_axis(Axis(1), 0);
                writer.put_values(name, &[offset, 0], surface.into_dyn())?;
            }
        }
        self.cursor += times.len();
        debug!("Appended {} time steps to {}", times.len(), identifier);
        Ok(())
    }

    /// Commit the output and return the writer
    pub fn finish(self) -> Result<W, StoreError> {
        if self.schema.is_none() {
            return Err(StoreError::UnsupportedOperation(format!(
                "schema of {} not created",
                self.identifier()
            )));
        }
        let (identifier, cursor) = (self.identifier(), self.cursor);
        let writer = self.guard.commit()?;
        info!("Wrote {} time steps to {}", cursor, identifier);
        Ok(writer)
    }
}

fn station_time_encoding() -> Result<TimeEncoding, StoreError> {
    TimeEncoding::parse(STATION_TIME_UNITS, OUTPUT_CALENDAR)
        .map_err(|e| StoreError::ConversionError(e.to_string()))
}

/// One data variable of a loaded station series, always `[time, level, station]`
#[derive(Debug, Clone)]
pub struct SeriesVariable {
    pub meta: VariableMeta,
    pub data: Array3<f64>,
}

/// Fully loaded station series dataset
#[derive(Debug, Clone)]
pub struct StationSeries {
    pub identifier: String,
    pub times: Vec<NaiveDateTime>,
    pub stations: StationCoordinates,
    pub levels: Option<Vec<f64>>,
    pub variables: Vec<SeriesVariable>,
}

impl StationSeries {
    /// Read a dataset written by [`StationSeriesStore`]
    pub fn load(reader: &dyn DataReader) -> Result<Self, SeriesError> {
        let dataset = reader.identifier();
        let store_err = |source: StoreError| SeriesError::Store {
            dataset: dataset.clone(),
            source,
        };
        let read_1d = |name: &str| -> Result<Vec<f64>, SeriesError> {
            if !reader.has_variable(name) {
                return Err(SeriesError::MissingVariable {
                    dataset: dataset.clone(),
                    variable: name.to_string(),
                });
            }
            Ok(reader.read_variable(name).map_err(store_err)?.iter().copied().collect())
        };

        let units = reader
            .get_variable_attribute(TIME_DIM, "units")
            .map_err(store_err)?;
        let units = units.as_str().unwrap_or(STATION_TIME_UNITS).to_string();
        let calendar = reader
            .get_variable_attribute(TIME_DIM, "calendar")
            .ok()
            .and_then(|c| c.as_str().map(str::to_string))
            .unwrap_or_else(|| OUTPUT_CALENDAR.to_string());
        let encoding = TimeEncoding::parse(&units, &calendar).map_err(|source| SeriesError::Time {
            dataset: dataset.clone(),
            source,
        })?;
        let times = read_1d(TIME_DIM)?
            .into_iter()
            .map(|v| encoding.decode(v))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SeriesError::Time {
                dataset: dataset.clone(),
                source,
            })?;

        let stations = StationCoordinates {
            ids: read_1d(STATION_DIM)?,
            latitudes: read_1d("latitude")?,
            longitudes: read_1d("longitude")?,
            heights: read_1d("height")?,
        };
        let levels = if reader.has_variable(LEVEL_DIM) {
            Some(read_1d(LEVEL_DIM)?)
        } else {
            None
        };

        let coordinates = [TIME_DIM, STATION_DIM, LEVEL_DIM, "latitude", "longitude", "height", "station_name"];
        let mut variables = Vec::new();
        for name in reader.list_variables().map_err(store_err)? {
            if coordinates.contains(&name.as_str()) {
                continue;
            }
            let info = reader.get_variable_info(&name).map_err(store_err)?;
            let raw = reader.read_variable(&name).map_err(store_err)?;
            let layout = |reason: String| SeriesError::Layout {
                dataset: dataset.clone(),
                variable: name.clone(),
                reason,
            };
            let data = match info.dimensions.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                [TIME_DIM, STATION_DIM] => raw
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| layout(e.to_string()))?
                    .insert_axis(Axis(1)),
                [TIME_DIM, LEVEL_DIM, STATION_DIM] => raw
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| layout(e.to_string()))?,
                other => return Err(layout(format!("dimensions {:?}", other))),
            };
            variables.push(SeriesVariable {
                meta: VariableMeta::new(&name, info.long_name, info.units),
                data,
            });
        }

        Ok(Self {
            identifier: dataset,
            times,
            stations,
            levels,
            variables,
        })
    }

    pub fn variable(&self, name: &str) -> Result<&SeriesVariable, SeriesError> {
        self.variables
            .iter()
            .find(|v| v.meta.name == name)
            .ok_or_else(|| SeriesError::MissingVariable {
                dataset: self.identifier.clone(),
                variable: name.to_string(),
            })
    }

    /// `[time, station]` values of a surface variable (level 0 of 3-D data)
    pub fn surface(&self, name: &str) -> Result<Array2<f64>, SeriesError> {
        Ok(self.variable(name)?.data.index_axis(Axis(1), 0).to_owned())
    }
}
