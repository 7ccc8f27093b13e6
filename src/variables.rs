//! Translation of CF standard names into reanalysis short names.

/// Kind of gridded dataset, named after its file prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Pressure levels
    PressureLevel,
    /// Surface analysis
    SurfaceAnalysis,
    /// Surface forecast (accumulated fields)
    SurfaceForecast,
    /// Time-invariant topography and land-sea mask
    Invariant,
}

impl DatasetKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DatasetKind::PressureLevel => "pl",
            DatasetKind::SurfaceAnalysis => "sa",
            DatasetKind::SurfaceForecast => "sf",
            DatasetKind::Invariant => "to",
        }
    }

    /// Short names that stand for one CF standard name in this dataset
    pub fn short_names(&self, standard_name: &str) -> &'static [&'static str] {
        match (self, standard_name) {
            (DatasetKind::SurfaceAnalysis, "air_temperature") => &["t2m"],
            (DatasetKind::SurfaceAnalysis, "relative_humidity") => &["d2m"],
            (
                DatasetKind::SurfaceAnalysis,
                "downwelling_shortwave_flux_in_air_assuming_clear_sky",
            ) => &["tco3", "tcwv"],
            (DatasetKind::SurfaceAnalysis, "wind_speed") => &["u10", "v10"],
            (DatasetKind::SurfaceForecast, "precipitation_amount") => &["tp"],
            (DatasetKind::SurfaceForecast, "downwelling_shortwave_flux_in_air") => &["ssrd"],
            (DatasetKind::SurfaceForecast, "downwelling_longwave_flux_in_air") => &["strd"],
            (DatasetKind::PressureLevel, "air_temperature") => &["t"],
            (DatasetKind::PressureLevel, "relative_humidity") => &["r"],
            (DatasetKind::PressureLevel, "wind_speed") => &["u", "v"],
            _ => &[],
        }
    }

    /// Short names to extract for the requested standard names, in request
    /// order without duplicates. Names without a translation are dropped.
    /// Pressure-level selections always include the geopotential `z`, the
    /// invariant set is always `z` and `lsm`.
    pub fn select(&self, standard_names: &[String]) -> Vec<String> {
        if *self == DatasetKind::Invariant {
            return vec!["z".to_string(), "lsm".to_string()];
        }
        let mut selected: Vec<String> = Vec::new();
        for name in standard_names {
            for short in self.short_names(name) {
                if !selected.iter().any(|s| s == short) {
                    selected.push(short.to_string());
                }
            }
        }
        if *self == DatasetKind::PressureLevel && !selected.iter().any(|s| s == "z") {
            selected.push("z".to_string());
        }
        selected
    }
}
