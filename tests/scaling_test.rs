use approx::assert_relative_eq;
use met2station::math::relative_humidity_from_dewpoint;
use met2station::scaling::{
    deaccumulate, output_time_grid, resample_accumulated, KernelRegistry, ScalingError,
};
use ndarray::Array2;

const HOUR: f64 = 3600.0;

#[test]
fn test_deaccumulation_recovers_increments() {
    // 3-hourly forecast accumulations restarting every 12 h
    let times: Vec<f64> = (1..=16).map(|i| i as f64 * 3.0 * HOUR).collect();
    let increments: Vec<f64> = (0..16).map(|i| (i % 5) as f64 * 0.4 + 0.1).collect();

    let mut accumulated = Vec::with_capacity(times.len());
    let mut running = 0.0;
    for (i, inc) in increments.iter().enumerate() {
        if i % 4 == 0 {
            running = 0.0;
        }
        running += inc;
        accumulated.push(running);
    }

    let totals = deaccumulate(&times, &accumulated, 12.0 * HOUR);
    assert_eq!(totals.len(), increments.len());
    for (total, inc) in totals.iter().zip(&increments) {
        assert_relative_eq!(*total, *inc, epsilon = 1e-12);
    }
}

#[test]
fn test_accumulated_resampling_conserves_rate() {
    // constant 2 mm per 3 h, expressed per 1 h output step
    let times: Vec<f64> = (1..=8).map(|i| i as f64 * 3.0 * HOUR).collect();
    let values = Array2::from_shape_fn((8, 1), |(i, _)| ((i % 4) + 1) as f64 * 2.0);
    let grid = output_time_grid(&[&times[..]], HOUR).unwrap();

    let out = resample_accumulated(&times, values.view(), &grid, 12.0 * HOUR, HOUR, "tp").unwrap();
    assert_eq!(out.dim(), (grid.len(), 1));
    for v in out.iter() {
        assert_relative_eq!(*v, 2.0 / 3.0, epsilon = 1e-12);
    }

    let single = Array2::from_elem((1, 1), 1.0);
    assert!(matches!(
        resample_accumulated(&times[..1], single.view(), &grid, 12.0 * HOUR, HOUR, "tp"),
        Err(ScalingError::InsufficientTimeSteps { found: 1, .. })
    ));
}

#[test]
fn test_output_axis_is_uniform_within_every_source() {
    let analysis: Vec<f64> = (0..=8).map(|i| i as f64 * 6.0 * HOUR).collect();
    let forecast: Vec<f64> = (1..=16).map(|i| i as f64 * 3.0 * HOUR).collect();
    let pressure: Vec<f64> = (1..=8).map(|i| i as f64 * 6.0 * HOUR).collect();

    for step_hours in [1.0, 2.0, 5.0, 24.0] {
        let step = step_hours * HOUR;
        let grid = output_time_grid(&[&pressure[..], &analysis[..], &forecast[..]], step).unwrap();
        assert_eq!(grid[0], 6.0 * HOUR);
        assert!(grid.windows(2).all(|w| (w[1] - w[0] - step).abs() < 1e-6));
        let last = *grid.last().unwrap();
        assert!(last <= 48.0 * HOUR);
        assert!(last + step > 48.0 * HOUR);
    }
}

#[test]
fn test_relative_humidity_bounds() {
    for t in [230.0, 260.0, 273.15, 300.0, 320.0] {
        for depression in [-5.0, 0.0, 0.5, 10.0, 40.0, 80.0] {
            let rh = relative_humidity_from_dewpoint(t, t - depression);
            assert!((0.1..=99.9).contains(&rh), "rh {} for t={} depression={}", rh, t, depression);
        }
    }
}

#[test]
fn test_standard_registry_resolution() {
    let registry = KernelRegistry::standard();
    let ids: Vec<String> = ["AIRT_C_sur", "RH_per_sur", "WIND_sur"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let kernels = registry.resolve(&ids, "ERAI").unwrap();
    let names: Vec<&str> = kernels.iter().map(|k| k.name()).collect();
    assert_eq!(names, vec!["AIRT_C_sur", "RH_per_sur", "WSPD_ms_sur", "WDIR_deg_sur"]);
    assert_eq!(
        kernels[0].output().map(|o| o.name.as_str()),
        Some("AIRT_ERAI_C_sur")
    );

    let unknown = vec!["SNOW_mm_sur".to_string()];
    assert!(matches!(
        registry.resolve(&unknown, "ERAI"),
        Err(ScalingError::UnknownKernel(_))
    ));
}
