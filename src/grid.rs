use crate::config::TimeWindow;
use crate::io::{DataReader, StoreError};
use crate::station::normalize_longitude;
use crate::time_utils::{TimeEncoding, TimeError};
use chrono::NaiveDateTime;
use log::{debug, info};
use ndarray::{concatenate, Array4, ArrayD, Axis, Ix4, IxDyn};
use std::ops::Range;
use thiserror::Error;

const TIME_NAMES: [&str; 2] = ["time", "valid_time"];
const LEVEL_NAMES: [&str; 4] = ["level", "plev", "pressure_level", "isobaricInhPa"];
const LATITUDE_NAMES: [&str; 2] = ["latitude", "lat"];
const LONGITUDE_NAMES: [&str; 2] = ["longitude", "lon"];

#[derive(Error, Debug)]
pub enum GridError {
    #[error("No files match {0}")]
    NoFilesMatched(String),

    #[error("Invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Empty time selection in {fileset}: no time steps in [{beg}, {end})")]
    EmptyTimeSelection {
        fileset: String,
        beg: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Variable {variable} not found in {fileset}")]
    MissingVariable { fileset: String, variable: String },

    #[error("Calendar mismatch in {fileset}: {file} uses '{found}', expected '{expected}'")]
    CalendarMismatch {
        fileset: String,
        file: String,
        expected: String,
        found: String,
    },

    #[error("Missing {axis} coordinate in {fileset}")]
    MissingCoordinate { fileset: String, axis: &'static str },

    #[error("Missing attribute {variable}:{attribute} in {fileset}")]
    MissingAttribute {
        fileset: String,
        variable: String,
        attribute: &'static str,
    },

    #[error("Inconsistent grid in {fileset}: {reason}")]
    InconsistentGrid { fileset: String, reason: String },

    #[error("Store error in {fileset}: {source}")]
    Store {
        fileset: String,
        #[source]
        source: StoreError,
    },

    #[error("Time decoding error in {fileset}: {source}")]
    Time {
        fileset: String,
        #[source]
        source: TimeError,
    },
}

/// Dimension names as they appear in the files of one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct GridDimensions {
    pub time: String,
    pub level: Option<String>,
    pub latitude: String,
    pub longitude: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AxisRole {
    Time,
    Level,
    Latitude,
    Longitude,
    Singleton,
}

/// Coordinate values sorted ascending with duplicates removed, plus the
/// index of each value in the file
#[derive(Debug, Clone)]
struct SortedAxis {
    values: Vec<f64>,
    order: Vec<usize>,
}

impl SortedAxis {
    fn new(raw: &[f64]) -> Self {
        let mut pairs: Vec<(usize, f64)> = raw
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .collect();
        pairs.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        pairs.dedup_by(|b, a| a.1 == b.1);
        Self {
            values: pairs.iter().map(|p| p.1).collect(),
            order: pairs.iter().map(|p| p.0).collect(),
        }
    }

    fn is_identity(&self, len: usize) -> bool {
        self.order.len() == len && self.order.iter().enumerate().all(|(i, &o)| i == o)
    }
}

/// Read-only view of one logical gridded dataset, possibly split across
/// several files along time.
pub struct GridStore {
    identifier: String,
    readers: Vec<Box<dyn DataReader>>,
    dims: GridDimensions,
    encoding: TimeEncoding,
    times: Vec<NaiveDateTime>,
    /// (file, index within file) of every global time step
    time_sources: Vec<(usize, usize)>,
    latitudes: SortedAxis,
    longitudes: SortedAxis,
    levels: Option<SortedAxis>,
    variables: Vec<String>,
}

impl std::fmt::Debug for GridStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridStore")
            .field("identifier", &self.identifier)
            .field("files", &self.readers.len())
            .field("times", &self.times.len())
            .field("variables", &self.variables)
            .finish()
    }
}

fn find_dimension(names: &[String], candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|c| names.iter().any(|n| n == *c))
        .map(|c| c.to_string())
}

impl GridStore {
    /// Open every NetCDF file matching `pattern` as one dataset
    #[cfg(feature = "netcdf")]
    pub fn open(pattern: &str) -> Result<Self, GridError> {
        use crate::io::{is_netcdf_format, NetCdfReader};

        let paths = glob::glob(pattern).map_err(|source| GridError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let mut paths: Vec<std::path::PathBuf> = paths
            .filter_map(Result::ok)
            .filter(|path| {
                let keep = is_netcdf_format(path);
                if !keep {
                    log::warn!("Skipping {}: not a NetCDF file", path.display());
                }
                keep
            })
            .collect();
        paths.sort();

        let mut readers: Vec<Box<dyn DataReader>> = Vec::with_capacity(paths.len());
        for path in &paths {
            let reader = NetCdfReader::open(path).map_err(|source| GridError::Store {
                fileset: pattern.to_string(),
                source,
            })?;
            readers.push(Box::new(reader));
        }
        Self::from_readers(pattern, readers)
    }

    /// Aggregate already opened readers along time
    pub fn from_readers(
        identifier: &str,
        readers: Vec<Box<dyn DataReader>>,
    ) -> Result<Self, GridError> {
        let fileset = identifier.to_string();
        let store_err = |source: StoreError| GridError::Store {
            fileset: fileset.clone(),
            source,
        };

        let first = readers
            .first()
            .ok_or_else(|| GridError::NoFilesMatched(fileset.clone()))?;
        let dim_names = first.list_dimensions().map_err(store_err)?;
        let missing = |axis: &'static str| GridError::MissingCoordinate {
            fileset: fileset.clone(),
            axis,
        };
        let dims = GridDimensions {
            time: find_dimension(&dim_names, &TIME_NAMES).ok_or_else(|| missing("time"))?,
            level: find_dimension(&dim_names, &LEVEL_NAMES),
            latitude: find_dimension(&dim_names, &LATITUDE_NAMES)
                .ok_or_else(|| missing("latitude"))?,
            longitude: find_dimension(&dim_names, &LONGITUDE_NAMES)
                .ok_or_else(|| missing("longitude"))?,
        };

        let read_axis = |reader: &dyn DataReader, name: &str| -> Result<Vec<f64>, GridError> {
            let values = reader.read_variable(name).map_err(store_err)?;
            Ok(values.iter().copied().collect())
        };

        let raw_lat = read_axis(first.as_ref(), &dims.latitude)?;
        let raw_lon: Vec<f64> = read_axis(first.as_ref(), &dims.longitude)?
            .into_iter()
            .map(normalize_longitude)
            .collect();
        let raw_levels = match &dims.level {
            Some(name) => Some(read_axis(first.as_ref(), name)?),
            None => None,
        };

        let encoding = Self::read_time_encoding(&fileset, first.as_ref(), &dims.time)?;

        let mut stamped: Vec<(NaiveDateTime, usize, usize)> = Vec::new();
        for (file_idx, reader) in readers.iter().enumerate() {
            let file_encoding = Self::read_time_encoding(&fileset, reader.as_ref(), &dims.time)?;
            if !file_encoding.is_compatible(&encoding) {
                return Err(GridError::CalendarMismatch {
                    fileset: fileset.clone(),
                    file: reader.identifier(),
                    expected: format!("{} ({})", encoding.units(), encoding.calendar),
                    found: format!("{} ({})", file_encoding.units(), file_encoding.calendar),
                });
            }
            for (name, expected) in [(&dims.latitude, raw_lat.len()), (&dims.longitude, raw_lon.len())] {
                let len = reader.get_dimension_info(name).map_err(store_err)?.size;
                if len != expected {
                    return Err(GridError::InconsistentGrid {
                        fileset: fileset.clone(),
                        reason: format!(
                            "{} has {} {} values, expected {}",
                            reader.identifier(),
                            len,
                            name,
                            expected
                        ),
                    });
                }
            }

            let raw_times = read_axis(reader.as_ref(), &dims.time)?;
            for (local, value) in raw_times.into_iter().enumerate() {
                let time = encoding.decode(value).map_err(|source| GridError::Time {
                    fileset: fileset.clone(),
                    source,
                })?;
                stamped.push((time, file_idx, local));
            }
        }
        stamped.sort_by_key(|&(t, file, local)| (t, file, local));
        stamped.dedup_by_key(|s| s.0);

        let mut coordinate_names = vec![dims.time.clone(), dims.latitude.clone(), dims.longitude.clone()];
        coordinate_names.extend(dims.level.clone());
        let variables: Vec<String> = first
            .list_variables()
            .map_err(store_err)?
            .into_iter()
            .filter(|v| !dim_names.contains(v) && !coordinate_names.contains(v))
            .collect();

        info!(
            "Opened {} with {} file(s), {} time steps, variables {:?}",
            fileset,
            readers.len(),
            stamped.len(),
            variables
        );

        Ok(Self {
            identifier: fileset,
            dims,
            encoding,
            times: stamped.iter().map(|s| s.0).collect(),
            time_sources: stamped.iter().map(|s| (s.1, s.2)).collect(),
            latitudes: SortedAxis::new(&raw_lat),
            longitudes: SortedAxis::new(&raw_lon),
            levels: raw_levels.as_deref().map(SortedAxis::new),
            variables,
            readers,
        })
    }

    fn read_time_encoding(
        fileset: &str,
        reader: &dyn DataReader,
        time_name: &str,
    ) -> Result<TimeEncoding, GridError> {
        let attrs = reader
            .get_variable_attributes(time_name)
            .map_err(|source| GridError::Store {
                fileset: fileset.to_string(),
                source,
            })?;
        let units = attrs
            .get("units")
            .and_then(|a| a.as_str())
            .ok_or_else(|| GridError::MissingAttribute {
                fileset: fileset.to_string(),
                variable: time_name.to_string(),
                attribute: "units",
            })?;
        // CF default when the attribute is absent
        let calendar = attrs
            .get("calendar")
            .and_then(|a| a.as_str())
            .unwrap_or("standard");
        TimeEncoding::parse(units, calendar).map_err(|source| GridError::Time {
            fileset: fileset.to_string(),
            source,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn dimensions(&self) -> &GridDimensions {
        &self.dims
    }

    pub fn time_encoding(&self) -> &TimeEncoding {
        &self.encoding
    }

    /// Absolute timestamps, sorted and deduplicated
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    /// Latitudes, ascending
    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes.values
    }

    /// Longitudes in [0, 360), ascending
    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes.values
    }

    /// Pressure levels, ascending; `None` for 2-D datasets
    pub fn levels(&self) -> Option<&[f64]> {
        self.levels.as_ref().map(|l| l.values.as_slice())
    }

    pub fn is_3d(&self) -> bool {
        self.levels.is_some()
    }

    /// Single time step, e.g. static topography
    pub fn is_invariant(&self) -> bool {
        self.times.len() == 1
    }

    /// Physical variables, without coordinate and dimension variables
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }

    pub fn require_variable(&self, name: &str) -> Result<(), GridError> {
        if self.has_variable(name) {
            Ok(())
        } else {
            Err(GridError::MissingVariable {
                fileset: self.identifier.clone(),
                variable: name.to_string(),
            })
        }
    }

    /// `long_name` and `units` of a variable as found in the first file
    pub fn variable_metadata(&self, name: &str) -> Result<(Option<String>, Option<String>), GridError> {
        self.require_variable(name)?;
        let info = self.readers[0]
            .get_variable_info(name)
            .map_err(|source| self.store_error(source))?;
        Ok((info.long_name, info.units))
    }

    /// Mask of time steps inside `window`; every step when `window` is `None`
    pub fn select_window(&self, window: Option<&TimeWindow>) -> Result<Vec<bool>, GridError> {
        let mask: Vec<bool> = match window {
            Some(w) => self.times.iter().map(|&t| w.contains(t)).collect(),
            None => vec![true; self.times.len()],
        };
        if !mask.iter().any(|&m| m) {
            let (beg, end) = match window {
                Some(w) => (w.beg, w.end),
                None => (NaiveDateTime::MIN, NaiveDateTime::MAX),
            };
            return Err(GridError::EmptyTimeSelection {
                fileset: self.identifier.clone(),
                beg,
                end,
            });
        }
        Ok(mask)
    }

    fn store_error(&self, source: StoreError) -> GridError {
        GridError::Store {
            fileset: self.identifier.clone(),
            source,
        }
    }

    fn axis_role(&self, dim: &str) -> AxisRole {
        if dim == self.dims.time {
            AxisRole::Time
        } else if Some(dim) == self.dims.level.as_deref() {
            AxisRole::Level
        } else if dim == self.dims.latitude {
            AxisRole::Latitude
        } else if dim == self.dims.longitude {
            AxisRole::Longitude
        } else {
            AxisRole::Singleton
        }
    }

    /// Read `variable` at the given global time indices in canonical
    /// `[time, level, latitude, longitude]` layout, with every spatial axis
    /// ascending. 2-D fields get a level axis of length 1.
    pub fn read_field(&self, variable: &str, time_indices: &[usize]) -> Result<Array4<f64>, GridError> {
        self.require_variable(variable)?;
        if let Some(&bad) = time_indices.iter().find(|&&i| i >= self.times.len()) {
            return Err(GridError::InconsistentGrid {
                fileset: self.identifier.clone(),
                reason: format!("time index {} out of range for {}", bad, variable),
            });
        }

        let info = self.readers[0]
            .get_variable_info(variable)
            .map_err(|source| self.store_error(source))?;
        let roles: Vec<AxisRole> = info.dimensions.iter().map(|d| self.axis_role(d)).collect();
        for (role, (dim, &len)) in roles.iter().zip(info.dimensions.iter().zip(&info.shape)) {
            if *role == AxisRole::Singleton && len != 1 {
                return Err(GridError::InconsistentGrid {
                    fileset: self.identifier.clone(),
                    reason: format!("{} has unsupported dimension {} of length {}", variable, dim, len),
                });
            }
        }
        let has_time = roles.contains(&AxisRole::Time);

        let mut blocks = Vec::new();
        if has_time {
            for (file, local) in self.time_runs(time_indices) {
                let ranges: Vec<Range<usize>> = roles
                    .iter()
                    .zip(&info.shape)
                    .map(|(role, &len)| match role {
                        AxisRole::Time => local.clone(),
                        _ => 0..len,
                    })
                    .collect();
                let block = self.readers[file]
                    .read_variable_slice(variable, &ranges)
                    .map_err(|source| self.store_error(source))?;
                blocks.push(self.to_canonical(variable, block, &roles)?);
            }
        } else {
            let block = self.readers[0]
                .read_variable(variable)
                .map_err(|source| self.store_error(source))?;
            let single = self.to_canonical(variable, block, &roles)?;
            for _ in time_indices {
                blocks.push(single.clone());
            }
        }

        let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
        let field = concatenate(Axis(0), &views).map_err(|e| GridError::InconsistentGrid {
            fileset: self.identifier.clone(),
            reason: format!("{}: {}", variable, e),
        })?;
        debug!("Read {} {:?} from {}", variable, field.shape(), self.identifier);
        Ok(field)
    }

    /// Group global time indices into runs of consecutive steps in one file
    fn time_runs(&self, time_indices: &[usize]) -> Vec<(usize, Range<usize>)> {
        let mut runs: Vec<(usize, Range<usize>)> = Vec::new();
        for &global in time_indices {
            let (file, local) = self.time_sources[global];
            match runs.last_mut() {
                Some((f, range)) if *f == file && range.end == local => range.end += 1,
                _ => runs.push((file, local..local + 1)),
            }
        }
        runs
    }

    fn to_canonical(
        &self,
        variable: &str,
        block: ArrayD<f64>,
        roles: &[AxisRole],
    ) -> Result<Array4<f64>, GridError> {
        let mut block = block;
        let mut roles: Vec<AxisRole> = roles.to_vec();

        // drop singleton axes, highest index first so positions stay valid
        for axis in (0..roles.len()).rev() {
            if roles[axis] == AxisRole::Singleton {
                block = block.index_axis_move(Axis(axis), 0);
                roles.remove(axis);
            }
        }
        for role in [AxisRole::Time, AxisRole::Level] {
            if !roles.contains(&role) {
                let ndim = block.ndim();
                block = block.insert_axis(Axis(ndim));
                roles.push(role);
            }
        }

        let layout_error = || GridError::InconsistentGrid {
            fileset: self.identifier.clone(),
            reason: format!("{} is missing a horizontal dimension", variable),
        };
        let mut permutation = Vec::with_capacity(4);
        for role in [AxisRole::Time, AxisRole::Level, AxisRole::Latitude, AxisRole::Longitude] {
            permutation.push(roles.iter().position(|r| *r == role).ok_or_else(layout_error)?);
        }
        let mut field = block
            .permuted_axes(IxDyn(&permutation))
            .into_dimensionality::<Ix4>()
            .map_err(|_| layout_error())?;

        if let Some(levels) = &self.levels {
            if field.len_of(Axis(1)) > 1 && !levels.is_identity(field.len_of(Axis(1))) {
                field = field.select(Axis(1), &levels.order);
            }
        }
        if !self.latitudes.is_identity(field.len_of(Axis(2))) {
            field = field.select(Axis(2), &self.latitudes.order);
        }
        if !self.longitudes.is_identity(field.len_of(Axis(3))) {
            field = field.select(Axis(3), &self.longitudes.order);
        }
        Ok(field.as_standard_layout().into_owned())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryDataset;
    use crate::time_utils::STATION_TIME_UNITS;
    use chrono::NaiveDate;
    use ndarray::{Array1, Array2, Array3};

    pub(crate) fn hours(h: f64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::seconds((h * 3600.0) as i64)
    }

    /// Surface dataset with descending latitudes, like the reanalysis files.
    /// `t2m(time, lat, lon) = 1000 * time + 10 * lat_index_in_file + lon`
    pub(crate) fn surface_dataset(name: &str, times: &[f64]) -> MemoryDataset {
        let lats = [2.0, 1.0, 0.0];
        let lons = [0.0, 1.0, 2.0, 3.0];
        let mut ds = MemoryDataset::new(name);
        ds.insert_variable("time", &["time"], Array1::from(times.to_vec()).into_dyn())
            .unwrap();
        ds.set_attribute("time", "units", STATION_TIME_UNITS).unwrap();
        ds.set_attribute("time", "calendar", "gregorian").unwrap();
        ds.insert_variable("latitude", &["latitude"], Array1::from(lats.to_vec()).into_dyn())
            .unwrap();
        ds.insert_variable("longitude", &["longitude"], Array1::from(lons.to_vec()).into_dyn())
            .unwrap();
        let t2m = Array3::from_shape_fn((times.len(), 3, 4), |(t, j, i)| {
            1000.0 * times[t] + 10.0 * j as f64 + i as f64
        });
        ds.insert_variable("t2m", &["time", "latitude", "longitude"], t2m.into_dyn())
            .unwrap();
        ds.set_attribute("t2m", "units", "K").unwrap();
        ds.set_attribute("t2m", "long_name", "2 metre temperature").unwrap();
        ds
    }

    fn store(datasets: Vec<MemoryDataset>) -> Result<GridStore, GridError> {
        let readers: Vec<Box<dyn DataReader>> = datasets
            .into_iter()
            .map(|d| Box::new(d) as Box<dyn DataReader>)
            .collect();
        GridStore::from_readers("erai_sa_*.nc", readers)
    }

    #[test]
    fn test_coordinates_sorted_and_catalog() {
        let grid = store(vec![surface_dataset("a", &[0.0, 6.0])]).unwrap();
        assert_eq!(grid.latitudes(), &[0.0, 1.0, 2.0]);
        assert_eq!(grid.longitudes(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(grid.variables(), &["t2m".to_string()]);
        assert!(!grid.is_3d());
        assert!(!grid.is_invariant());
        assert_eq!(grid.times(), &[hours(0.0), hours(6.0)]);
    }

    #[test]
    fn test_files_merged_along_time() {
        // second file overlaps the first at hour 12
        let grid = store(vec![
            surface_dataset("b", &[12.0, 18.0]),
            surface_dataset("a", &[0.0, 6.0, 12.0]),
        ])
        .unwrap();
        assert_eq!(
            grid.times(),
            &[hours(0.0), hours(6.0), hours(12.0), hours(18.0)]
        );

        let field = grid.read_field("t2m", &[1, 2, 3]).unwrap();
        assert_eq!(field.shape(), &[3, 1, 3, 4]);
        // ascending latitude index 0 is file row 2
        assert_eq!(field[[0, 0, 0, 0]], 6000.0 + 20.0);
        assert_eq!(field[[2, 0, 2, 3]], 18000.0 + 3.0);
    }

    #[test]
    fn test_window_selection() {
        let grid = store(vec![surface_dataset("a", &[0.0, 6.0, 12.0, 18.0])]).unwrap();
        let window = TimeWindow::new(hours(6.0), hours(18.0)).unwrap();
        assert_eq!(
            grid.select_window(Some(&window)).unwrap(),
            vec![false, true, true, false]
        );

        let empty = TimeWindow::new(hours(100.0), hours(200.0)).unwrap();
        assert!(matches!(
            grid.select_window(Some(&empty)),
            Err(GridError::EmptyTimeSelection { .. })
        ));
    }

    #[test]
    fn test_missing_variable() {
        let grid = store(vec![surface_dataset("a", &[0.0])]).unwrap();
        assert!(grid.is_invariant());
        assert!(matches!(
            grid.read_field("d2m", &[0]),
            Err(GridError::MissingVariable { .. })
        ));
    }

    #[test]
    fn test_calendar_mismatch() {
        let mut other = surface_dataset("b", &[24.0]);
        other
            .set_attribute("time", "units", "hours since 1979-01-01 00:00:00")
            .unwrap();
        let result = store(vec![surface_dataset("a", &[0.0]), other]);
        assert!(matches!(result, Err(GridError::CalendarMismatch { .. })));
    }

    #[test]
    fn test_no_files() {
        assert!(matches!(store(vec![]), Err(GridError::NoFilesMatched(_))));
    }

    #[test]
    fn test_static_field_gets_time_and_level_axes() {
        let mut ds = surface_dataset("a", &[0.0, 6.0]);
        let lsm = Array2::from_shape_fn((3, 4), |(j, i)| 10.0 * j as f64 + i as f64);
        ds.insert_variable("lsm", &["latitude", "longitude"], lsm.into_dyn())
            .unwrap();
        let grid = store(vec![ds]).unwrap();

        let field = grid.read_field("lsm", &[0, 1]).unwrap();
        assert_eq!(field.shape(), &[2, 1, 3, 4]);
        assert_eq!(field[[0, 0, 0, 3]], 23.0);
        assert_eq!(field[[1, 0, 2, 0]], 0.0);
    }

    #[test]
    fn test_transposed_layout_is_normalised() {
        let mut ds = surface_dataset("a", &[0.0, 6.0]);
        // same values stored as (longitude, latitude, time)
        let t2m = ds.variable_data("t2m").unwrap().clone();
        let transposed = t2m.permuted_axes(IxDyn(&[2, 1, 0])).as_standard_layout().into_owned();
        ds.insert_variable("t2m_t", &["longitude", "latitude", "time"], transposed)
            .unwrap();
        let grid = store(vec![ds]).unwrap();

        let a = grid.read_field("t2m", &[0, 1]).unwrap();
        let b = grid.read_field("t2m_t", &[0, 1]).unwrap();
        assert_eq!(a, b);
    }
}
