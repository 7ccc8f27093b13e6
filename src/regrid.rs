use crate::config::UnmappedPolicy;
use crate::grid::{GridError, GridStore};
use crate::math::{check_monotonic, find_cell, InterpolationError};
use crate::station::StationSet;
use log::{debug, warn};
use ndarray::{Array3, ArrayView4, Axis};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegridError {
    #[error("No time steps selected in {fileset}")]
    NoTimeStepsSelected { fileset: String },

    #[error("Variables {missing:?} not found in {fileset}")]
    VariableSetMismatch { fileset: String, missing: Vec<String> },

    #[error("Station {station} ({latitude}, {longitude}) lies outside the source grid")]
    StationOutsideGrid {
        station: i32,
        latitude: f64,
        longitude: f64,
    },

    #[error("Invalid source mesh along {axis}: {source}")]
    InvalidMesh {
        axis: &'static str,
        #[source]
        source: InterpolationError,
    },

    #[error("Time mask has {found} entries, {fileset} has {expected} time steps")]
    MaskLength {
        fileset: String,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Horizontal coordinates of a source grid, both ascending, longitudes in
/// [0, 360)
#[derive(Debug, Clone)]
pub struct SourceMesh {
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    periodic: bool,
}

impl SourceMesh {
    pub fn new(latitudes: Vec<f64>, longitudes: Vec<f64>) -> Result<Self, RegridError> {
        check_monotonic(&latitudes).map_err(|source| RegridError::InvalidMesh {
            axis: "latitude",
            source,
        })?;
        check_monotonic(&longitudes).map_err(|source| RegridError::InvalidMesh {
            axis: "longitude",
            source,
        })?;
        // a global grid closes the gap between its last and first longitude
        let periodic = match longitudes.as_slice() {
            [first, second, .., last] => {
                let spacing = second - first;
                (first + 360.0 - last - spacing).abs() < 1e-6 * spacing.max(1.0)
            }
            _ => false,
        };
        Ok(Self {
            latitudes,
            longitudes,
            periodic,
        })
    }

    pub fn from_store(store: &GridStore) -> Result<Self, RegridError> {
        Self::new(store.latitudes().to_vec(), store.longitudes().to_vec())
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.latitudes.len(), self.longitudes.len())
    }

    fn locate_longitude(&self, longitude: f64) -> Option<(usize, usize, f64)> {
        if let Some(cell) = find_cell(&self.longitudes, longitude) {
            return Some(cell);
        }
        if !self.periodic {
            return None;
        }
        let first = self.longitudes[0];
        let last_idx = self.longitudes.len() - 1;
        let last = self.longitudes[last_idx];
        let gap = first + 360.0 - last;
        let offset = if longitude > last {
            longitude - last
        } else {
            longitude + 360.0 - last
        };
        Some((last_idx, 0, offset / gap))
    }

    /// Bilinear weights of the four surrounding cell corners, `None` when the
    /// point is outside the mesh
    pub fn locate(&self, latitude: f64, longitude: f64) -> Option<StationWeights> {
        let (y0, y1, wy) = find_cell(&self.latitudes, latitude)?;
        let (x0, x1, wx) = self.locate_longitude(longitude)?;
        Some(StationWeights {
            corners: [
                (y0, x0, (1.0 - wy) * (1.0 - wx)),
                (y0, x1, (1.0 - wy) * wx),
                (y1, x0, wy * (1.0 - wx)),
                (y1, x1, wy * wx),
            ],
        })
    }
}

/// Interpolation weights of one station: `(lat index, lon index, weight)`
#[derive(Debug, Clone, PartialEq)]
pub struct StationWeights {
    pub corners: [(usize, usize, f64); 4],
}

impl StationWeights {
    pub fn total(&self) -> f64 {
        self.corners.iter().map(|c| c.2).sum()
    }

    /// Weighted sum over one horizontal slice. Corners with zero weight are
    /// skipped so a NaN there does not leak into the result.
    fn apply(&self, slice: &ndarray::ArrayView2<f64>) -> f64 {
        self.corners
            .iter()
            .filter(|c| c.2 != 0.0)
            .map(|&(y, x, w)| w * slice[[y, x]])
            .sum()
    }
}

/// Values of several variables at the stations for one time chunk
#[derive(Debug, Clone)]
pub struct RegriddedChunk {
    /// Global time indices of the chunk, ascending
    pub time_indices: Vec<usize>,
    pub variables: Vec<String>,
    /// One `[time, level, station]` array per variable
    pub fields: Vec<Array3<f64>>,
}

impl RegriddedChunk {
    pub fn field(&self, variable: &str) -> Option<&Array3<f64>> {
        self.variables
            .iter()
            .position(|v| v == variable)
            .map(|i| &self.fields[i])
    }
}

/// Bilinear interpolation from a regular lat/lon grid to fixed stations.
///
/// Weights are computed once at construction and reused for every chunk.
#[derive(Debug, Clone)]
pub struct SpatialRegridder {
    mesh: SourceMesh,
    weights: Vec<Option<StationWeights>>,
    fill_value: f64,
}

impl SpatialRegridder {
    pub fn new(
        mesh: SourceMesh,
        stations: &StationSet,
        policy: UnmappedPolicy,
        fill_value: f64,
    ) -> Result<Self, RegridError> {
        let mut weights = Vec::with_capacity(stations.len());
        for station in stations {
            let located = mesh.locate(station.latitude, station.longitude);
            if located.is_none() {
                match policy {
                    UnmappedPolicy::Error => {
                        return Err(RegridError::StationOutsideGrid {
                            station: station.id,
                            latitude: station.latitude,
                            longitude: station.longitude,
                        })
                    }
                    UnmappedPolicy::Ignore => warn!(
                        "Station {} ({}, {}) is outside the source grid, filling with {}",
                        station.id, station.latitude, station.longitude, fill_value
                    ),
                }
            }
            weights.push(located);
        }
        debug!(
            "Computed weights for {} stations on a {:?} mesh",
            weights.len(),
            mesh.shape()
        );
        Ok(Self {
            mesh,
            weights,
            fill_value,
        })
    }

    pub fn weights(&self) -> &[Option<StationWeights>] {
        &self.weights
    }

    /// Interpolate a `[time, level, lat, lon]` field to `[time, level, station]`
    pub fn interpolate_field(&self, field: ArrayView4<f64>) -> Array3<f64> {
        let (nt, nl) = (field.len_of(Axis(0)), field.len_of(Axis(1)));
        let mut out = Array3::from_elem((nt, nl, self.weights.len()), self.fill_value);
        for t in 0..nt {
            for l in 0..nl {
                let slice = field.slice(ndarray::s![t, l, .., ..]);
                for (s, weights) in self.weights.iter().enumerate() {
                    if let Some(w) = weights {
                        out[[t, l, s]] = w.apply(&slice);
                    }
                }
            }
        }
        out
    }

    /// Interpolate `variables` at the time steps flagged in `mask`
    pub fn regrid(
        &self,
        store: &GridStore,
        mask: &[bool],
        variables: &[String],
    ) -> Result<RegriddedChunk, RegridError> {
        if mask.len() != store.times().len() {
            return Err(RegridError::MaskLength {
                fileset: store.identifier().to_string(),
                expected: store.times().len(),
                found: mask.len(),
            });
        }
        let time_indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();
        if time_indices.is_empty() {
            return Err(RegridError::NoTimeStepsSelected {
                fileset: store.identifier().to_string(),
            });
        }
        let missing: Vec<String> = variables
            .iter()
            .filter(|v| !store.has_variable(v))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RegridError::VariableSetMismatch {
                fileset: store.identifier().to_string(),
                missing,
            });
        }
        let (nlat, nlon) = self.mesh.shape();
        if store.latitudes().len() != nlat || store.longitudes().len() != nlon {
            return Err(RegridError::Grid(GridError::InconsistentGrid {
                fileset: store.identifier().to_string(),
                reason: format!("grid does not match the {}x{} weight mesh", nlat, nlon),
            }));
        }

        let mut fields = Vec::with_capacity(variables.len());
        for variable in variables {
            let field = store.read_field(variable, &time_indices)?;
            fields.push(self.interpolate_field(field.view()));
        }
        Ok(RegriddedChunk {
            time_indices,
            variables: variables.to_vec(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::Station;
    use approx::assert_relative_eq;
    use ndarray::Array4;

    fn unit_square() -> Array4<f64> {
        // lat 0: 10 (lon 0), 20 (lon 1); lat 1: 30, 40
        Array4::from_shape_vec((1, 1, 2, 2), vec![10.0, 20.0, 30.0, 40.0]).unwrap()
    }

    fn stations(points: &[(f64, f64)]) -> StationSet {
        StationSet::new(
            points
                .iter()
                .enumerate()
                .map(|(i, &(lat, lon))| Station::new(i as i32 + 1, "s", lat, lon, 0.0))
                .collect(),
        )
    }

    #[test]
    fn test_centroid_of_unit_square() {
        let mesh = SourceMesh::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        let regridder =
            SpatialRegridder::new(mesh, &stations(&[(0.5, 0.5)]), UnmappedPolicy::Error, -9999.0)
                .unwrap();
        let out = regridder.interpolate_field(unit_square().view());
        assert_relative_eq!(out[[0, 0, 0]], 25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_exact_node_returns_node_value() {
        let mesh = SourceMesh::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        let mut field = unit_square();
        // the neighbour of the node must not contribute, even when missing
        field[[0, 0, 0, 1]] = f64::NAN;
        let regridder =
            SpatialRegridder::new(mesh, &stations(&[(1.0, 0.0)]), UnmappedPolicy::Error, -9999.0)
                .unwrap();
        let out = regridder.interpolate_field(field.view());
        assert_eq!(out[[0, 0, 0]], 30.0);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let mesh = SourceMesh::new(vec![0.0, 0.75, 1.5], vec![0.0, 0.75, 1.5, 2.25]).unwrap();
        for &(lat, lon) in &[(0.1, 0.2), (1.2, 2.0), (0.75, 1.0), (1.5, 2.25)] {
            let w = mesh.locate(lat, lon).unwrap();
            assert_relative_eq!(w.total(), 1.0, epsilon = 1e-12);
            assert!(w.corners.iter().all(|c| c.2 >= 0.0));
        }
    }

    #[test]
    fn test_unmapped_station_policy() {
        let mesh = SourceMesh::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        let set = stations(&[(5.0, 0.5), (0.5, 0.5)]);

        let strict = SpatialRegridder::new(mesh.clone(), &set, UnmappedPolicy::Error, -9999.0);
        assert!(matches!(strict, Err(RegridError::StationOutsideGrid { station: 1, .. })));

        let lenient = SpatialRegridder::new(mesh, &set, UnmappedPolicy::Ignore, -9999.0).unwrap();
        let out = lenient.interpolate_field(unit_square().view());
        assert_eq!(out[[0, 0, 0]], -9999.0);
        assert_relative_eq!(out[[0, 0, 1]], 25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_periodic_longitude_wraps() {
        let lons: Vec<f64> = (0..4).map(|i| i as f64 * 90.0).collect();
        let mesh = SourceMesh::new(vec![0.0, 10.0], lons).unwrap();
        let w = mesh.locate(0.0, 315.0).unwrap();
        assert_eq!((w.corners[0].1, w.corners[1].1), (3, 0));
        assert_relative_eq!(w.corners[1].2, 0.5, epsilon = 1e-12);

        let regional = SourceMesh::new(vec![0.0, 10.0], vec![0.0, 1.0, 2.0]).unwrap();
        assert!(regional.locate(0.0, 359.0).is_none());
    }

    #[test]
    fn test_regrid_from_store() {
        use crate::grid::tests::surface_dataset;
        use crate::io::DataReader;

        let readers: Vec<Box<dyn DataReader>> =
            vec![Box::new(surface_dataset("a", &[0.0, 6.0, 12.0]))];
        let store = GridStore::from_readers("sa", readers).unwrap();
        let mesh = SourceMesh::from_store(&store).unwrap();
        let regridder =
            SpatialRegridder::new(mesh, &stations(&[(2.0, 3.0)]), UnmappedPolicy::Error, -9999.0)
                .unwrap();

        let chunk = regridder
            .regrid(&store, &[false, true, true], &["t2m".to_string()])
            .unwrap();
        assert_eq!(chunk.time_indices, vec![1, 2]);
        let t2m = chunk.field("t2m").unwrap();
        assert_eq!(t2m.shape(), &[2, 1, 1]);
        // latitude 2.0 is the first row in the file
        assert_eq!(t2m[[0, 0, 0]], 6003.0);

        assert!(matches!(
            regridder.regrid(&store, &[false, false, false], &["t2m".to_string()]),
            Err(RegridError::NoTimeStepsSelected { .. })
        ));
        assert!(matches!(
            regridder.regrid(&store, &[true, true, true], &["d2m".to_string()]),
            Err(RegridError::VariableSetMismatch { .. })
        ));
    }
}
