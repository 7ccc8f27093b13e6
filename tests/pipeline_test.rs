use approx::assert_relative_eq;
use met2station::builder::StationTimeSeriesBuilder;
use met2station::config::{Constants, InterpolationConfig, ScalingConfig};
use met2station::grid::GridStore;
use met2station::io::{DataReader, MemoryDataset};
use met2station::scaling::{ScalingInputs, ScalingKernelEngine, ScalingReport, SCALED_FILL_VALUE};
use met2station::series::StationSeries;
use met2station::station::{Station, StationSet};
use met2station::variables::DatasetKind;
use met2station::vertical::VerticalInterpolator;
use met2station::STATION_TIME_UNITS;
use ndarray::{Array1, ArrayD, Axis, IxDyn};

const LATS: [f64; 4] = [48.0, 47.0, 46.0, 45.0];
const LONS: [f64; 5] = [6.0, 7.0, 8.0, 9.0, 10.0];

type Field<'a> = (&'a str, Box<dyn Fn(usize, usize) -> f64 + 'a>);

fn field<'a>(name: &'a str, f: impl Fn(usize, usize) -> f64 + 'a) -> Field<'a> {
    (name, Box::new(f))
}

/// Gridded dataset whose fields are uniform in space; `f(time, level)`
fn gridded(
    name: &str,
    times: &[f64],
    levels: Option<&[f64]>,
    fields: Vec<Field<'_>>,
) -> MemoryDataset {
    let mut ds = MemoryDataset::new(name);
    ds.insert_variable("time", &["time"], Array1::from(times.to_vec()).into_dyn())
        .unwrap();
    ds.set_attribute("time", "units", STATION_TIME_UNITS).unwrap();
    ds.set_attribute("time", "calendar", "gregorian").unwrap();
    ds.insert_variable("latitude", &["latitude"], Array1::from(LATS.to_vec()).into_dyn())
        .unwrap();
    ds.insert_variable("longitude", &["longitude"], Array1::from(LONS.to_vec()).into_dyn())
        .unwrap();

    let (dims, shape): (Vec<&str>, Vec<usize>) = match levels {
        Some(levels) => {
            ds.insert_variable("level", &["level"], Array1::from(levels.to_vec()).into_dyn())
                .unwrap();
            (
                vec!["time", "level", "latitude", "longitude"],
                vec![times.len(), levels.len(), LATS.len(), LONS.len()],
            )
        }
        None => (
            vec!["time", "latitude", "longitude"],
            vec![times.len(), LATS.len(), LONS.len()],
        ),
    };
    let has_level = levels.is_some();
    for (variable, f) in &fields {
        let data = ArrayD::from_shape_fn(IxDyn(&shape), |ix| {
            let level = if has_level { ix[1] } else { 0 };
            f(ix[0], level)
        });
        ds.insert_variable(variable, &dims, data).unwrap();
    }
    ds
}

fn store(pattern: &str, ds: MemoryDataset) -> GridStore {
    let readers: Vec<Box<dyn DataReader>> = vec![Box::new(ds)];
    GridStore::from_readers(pattern, readers).unwrap()
}

fn stations() -> StationSet {
    StationSet::new(vec![
        Station::new(1, "Ridge", 46.2, 7.5, 2000.0).with_sky_view(0.8),
        Station::new(2, "Valley", 46.7, 8.3, 1000.0).with_sky_view(1.0),
    ])
}

/// One time range of each dataset kind over the Alps, uniform in space
fn reanalysis() -> Vec<(DatasetKind, MemoryDataset)> {
    let g = Constants::default().gravity;
    let analysis: Vec<f64> = (0..=4).map(|i| i as f64 * 6.0).collect();
    let forecast: Vec<f64> = (1..=8).map(|i| i as f64 * 3.0).collect();
    // forecast fields accumulate over 3 h steps and reset every 12 h
    let steps_into_period = |t: usize| (t % 4 + 1) as f64;

    let pl = gridded(
        "erai_pl_2010.nc",
        &analysis,
        Some(&[700.0, 850.0][..]),
        vec![
            field("t", |_, l| if l == 0 { 262.0 } else { 277.0 }),
            field("r", |_, _| 60.0),
            field("u", |_, _| 1.0),
            field("v", |_, _| 1.0),
            field("z", move |_, l| if l == 0 { 3000.0 * g } else { 1500.0 * g }),
        ],
    );
    let sa = gridded(
        "erai_sa_2010.nc",
        &analysis,
        None,
        vec![
            field("t2m", |_, _| 280.0),
            field("d2m", |_, _| 275.0),
            field("u10", |_, _| 3.0),
            field("v10", |_, _| 4.0),
        ],
    );
    let sf = gridded(
        "erai_sf_2010.nc",
        &forecast,
        None,
        vec![
            field("tp", move |t, _| steps_into_period(t) * 0.001),
            field("ssrd", move |t, _| steps_into_period(t) * 100.0 * 3.0 * 3600.0),
            field("strd", move |t, _| steps_into_period(t) * 300.0 * 3.0 * 3600.0),
        ],
    );
    let to = gridded(
        "erai_to.nc",
        &[0.0],
        None,
        vec![field("z", move |_, _| 500.0 * g), field("lsm", |_, _| 1.0)],
    );
    vec![
        (DatasetKind::Invariant, to),
        (DatasetKind::SurfaceAnalysis, sa),
        (DatasetKind::SurfaceForecast, sf),
        (DatasetKind::PressureLevel, pl),
    ]
}

struct Chain {
    surface_analysis: StationSeries,
    scaled: MemoryDataset,
    report: ScalingReport,
}

/// Station series for every kind, vertical interpolation, then scaling,
/// all with the default configuration
fn run_chain(stations: &StationSet) -> Chain {
    let config = InterpolationConfig::default();
    let builder = StationTimeSeriesBuilder::new(&config, stations).unwrap();

    let mut series = Vec::new();
    for (kind, ds) in reanalysis() {
        let variables = kind.select(&config.variables);
        let grid = store(&format!("erai_{}_*.nc", kind.prefix()), ds);
        let out = builder
            .build(&grid, &variables, MemoryDataset::new(kind.prefix()))
            .unwrap();
        series.push(StationSeries::load(&out).unwrap());
    }
    let pl = series.pop().unwrap();
    let sf = series.pop().unwrap();
    let sa = series.pop().unwrap();
    let to = series.pop().unwrap();
    assert_eq!(to.times.len(), 1);
    assert_eq!(sf.times.len(), 8);
    assert_eq!(pl.levels.as_deref(), Some(&[700.0, 850.0][..]));

    let surface = VerticalInterpolator::new(&config)
        .run(&pl, MemoryDataset::new("pl_surface"))
        .unwrap();
    let surface = StationSeries::load(&surface).unwrap();

    let scaling = ScalingConfig::default();
    let mut engine = ScalingKernelEngine::new(&scaling, stations).unwrap();
    let inputs = ScalingInputs::new(surface, sa.clone(), sf, to);
    let (scaled, report) = engine.run(&inputs, MemoryDataset::new("scaled")).unwrap();
    Chain {
        surface_analysis: sa,
        scaled,
        report,
    }
}

fn column(scaled: &MemoryDataset, name: &str, station: usize) -> Vec<f64> {
    scaled
        .variable_data(name)
        .unwrap()
        .index_axis(Axis(1), station)
        .iter()
        .copied()
        .collect()
}

#[test]
fn test_memory_pipeline_end_to_end() {
    let Chain { scaled, report, .. } = run_chain(&stations());
    assert_eq!(report.time_steps, 22);
    assert!(report.noop.is_empty());

    // 2000 m is a third of the way from 1500 m (850 hPa) to 3000 m (700 hPa)
    for p in column(&scaled, "PRESS_ERAI_Pa_pl", 0) {
        assert_relative_eq!(p, 80000.0, epsilon = 1e-6);
    }
    // 1000 m is below the lowest level
    for p in column(&scaled, "PRESS_ERAI_Pa_pl", 1) {
        assert_relative_eq!(p, 85000.0, epsilon = 1e-6);
    }
    for t in column(&scaled, "AIRT_ERAI_C_pl", 0) {
        assert_relative_eq!(t, 272.0 - 273.15, epsilon = 1e-6);
    }
    for s in 0..2 {
        for t in column(&scaled, "AIRT_ERAI_C_sur", s) {
            assert_relative_eq!(t, 6.85, epsilon = 1e-9);
        }
        for rh in column(&scaled, "RH_ERAI_per_sur", s) {
            assert_relative_eq!(rh, 75.0, epsilon = 1e-9);
        }
        for w in column(&scaled, "WSPD_ERAI_ms_sur", s) {
            assert_relative_eq!(w, 5.0, epsilon = 1e-9);
        }
        for p in column(&scaled, "PREC_ERAI_mm_sur", s) {
            assert_relative_eq!(p, 1.0 / 3.0, epsilon = 1e-9);
        }
        for sw in column(&scaled, "SW_ERAI_Wm2_sur", s) {
            assert_relative_eq!(sw, 100.0, epsilon = 1e-6);
        }
        for lw in column(&scaled, "LW_ERAI_Wm2_sur", s) {
            assert_relative_eq!(lw, 300.0, epsilon = 1e-6);
        }
    }
    assert_eq!(scaled.read_strings("station_name").unwrap(), vec!["Ridge", "Valley"]);
}

#[test]
fn test_station_outside_grid_is_filled_downstream() {
    // default config ignores unmapped stations and fills them
    let stations = StationSet::new(vec![
        Station::new(1, "Ridge", 46.2, 7.5, 2000.0).with_sky_view(0.8),
        Station::new(2, "Coast", 38.0, 8.0, 20.0).with_sky_view(1.0),
    ]);
    let Chain {
        surface_analysis,
        scaled,
        report,
    } = run_chain(&stations);

    let t2m = surface_analysis.surface("t2m").unwrap();
    assert!(t2m.column(1).iter().all(|v| v.is_nan()));
    assert!(t2m.column(0).iter().all(|&v| v == 280.0));

    assert_eq!(report.time_steps, 22);
    assert!(!report.produced.is_empty());
    for name in &report.produced {
        assert!(
            column(&scaled, name, 1).iter().all(|&v| v == SCALED_FILL_VALUE),
            "{} not filled for the unmapped station",
            name
        );
        assert!(
            column(&scaled, name, 0).iter().all(|v| v.is_finite() && *v != SCALED_FILL_VALUE),
            "{} missing for the mapped station",
            name
        );
    }
    for t in column(&scaled, "AIRT_ERAI_C_sur", 0) {
        assert_relative_eq!(t, 6.85, epsilon = 1e-9);
    }
}

#[cfg(feature = "netcdf")]
mod netcdf_files {
    use super::*;
    use met2station::io::{DataType, DataWriter, NetCdfReader, NetCdfWriter, VariableSpec};
    use ndarray::Array3;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write one surface analysis file the way the reanalysis server does:
    /// descending latitudes, float fields, hours since 1900
    fn write_surface_file(path: &Path, times: &[f64]) {
        let mut w = NetCdfWriter::create(path).unwrap();
        w.add_dimension("time", None).unwrap();
        w.add_dimension("latitude", Some(LATS.len())).unwrap();
        w.add_dimension("longitude", Some(LONS.len())).unwrap();
        w.add_variable(
            &VariableSpec::new("time", &["time"], DataType::Double)
                .with_attribute("units", STATION_TIME_UNITS)
                .with_attribute("calendar", "gregorian"),
        )
        .unwrap();
        w.add_variable(&VariableSpec::new("latitude", &["latitude"], DataType::Float))
            .unwrap();
        w.add_variable(&VariableSpec::new("longitude", &["longitude"], DataType::Float))
            .unwrap();
        let dims = ["time", "latitude", "longitude"];
        for (name, units) in [("t2m", "K"), ("d2m", "K"), ("u10", "m s**-1"), ("v10", "m s**-1")] {
            w.add_variable(
                &VariableSpec::new(name, &dims, DataType::Float).with_attribute("units", units),
            )
            .unwrap();
        }

        w.put_values("time", &[0], Array1::from(times.to_vec()).into_dyn().view())
            .unwrap();
        w.put_values("latitude", &[0], Array1::from(LATS.to_vec()).into_dyn().view())
            .unwrap();
        w.put_values("longitude", &[0], Array1::from(LONS.to_vec()).into_dyn().view())
            .unwrap();
        let shape = (times.len(), LATS.len(), LONS.len());
        for (name, value) in [("t2m", 280.0), ("d2m", 275.0), ("u10", 3.0), ("v10", 4.0)] {
            let data = Array3::from_elem(shape, value);
            w.put_values(name, &[0, 0, 0], data.into_dyn().view()).unwrap();
        }
        w.sync().unwrap();
    }

    #[test]
    fn test_surface_analysis_files_to_station_series() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_surface_file(&input.path().join("erai_sa_201001.nc"), &[0.0, 6.0, 12.0]);
        write_surface_file(&input.path().join("erai_sa_201002.nc"), &[18.0, 24.0]);

        let config = InterpolationConfig {
            variables: vec!["air_temperature".to_string(), "wind_speed".to_string()],
            ..InterpolationConfig::default()
        };
        let stations = stations();
        let grid = GridStore::open(&input.path().join("erai_sa_*.nc").to_string_lossy()).unwrap();
        assert_eq!(grid.times().len(), 5);
        let path = output.path().join("erai_sa_sites.nc");
        let builder = StationTimeSeriesBuilder::new(&config, &stations).unwrap();
        builder
            .build(
                &grid,
                &DatasetKind::SurfaceAnalysis.select(&config.variables),
                NetCdfWriter::create(&path).unwrap(),
            )
            .unwrap();

        let series = StationSeries::load(&NetCdfReader::open(&path).unwrap()).unwrap();
        assert_eq!(series.times.len(), 5);
        assert_eq!(series.stations.ids, vec![1.0, 2.0]);
        let t2m = series.surface("t2m").unwrap();
        assert!(t2m.iter().all(|&v| (v - 280.0).abs() < 1e-4));
        assert!(series.variable("d2m").is_err());
    }
}
