use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while validating run configuration, before any I/O happens
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Bounding box too small: {span:.2} degrees of {axis} (minimum {minimum})")]
    BoundingBoxTooSmall {
        axis: &'static str,
        span: f64,
        minimum: f64,
    },

    #[error("Invalid date range: end {end} is before beginning {beg}")]
    InvalidDateRange { beg: NaiveDateTime, end: NaiveDateTime },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Physical constants shared by the vertical and scaling stages
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Constants {
    /// Standard gravity (m/s²), converts geopotential to geopotential height
    pub gravity: f64,
    /// Universal gas constant (J/(mol·K)) used by the barometric formula
    pub gas_constant: f64,
    /// Molar mass of dry air (kg/mol)
    pub molar_mass_air: f64,
    /// Sea-level standard pressure (Pa)
    pub p0: f64,
    /// Sea-level standard temperature (K)
    pub t0: f64,
    /// Stefan-Boltzmann constant (W/(m²·K⁴))
    pub stefan_boltzmann: f64,
    /// 0 °C in Kelvin
    pub zero_celsius: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            gravity: 9.80665,
            gas_constant: 8.31432,
            molar_mass_air: 0.0289644,
            p0: 101325.0,
            t0: 288.15,
            stefan_boltzmann: 5.67e-8,
            zero_celsius: 273.15,
        }
    }
}

/// Area of interest in decimal degrees
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Smallest span (degrees) the reanalysis grid can meaningfully resolve
    pub const MIN_SPAN_DEGREES: f64 = 1.5;

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(-90.0..=90.0).contains(&self.north) || !(-90.0..=90.0).contains(&self.south) {
            return Err(ConfigurationError::InvalidBoundingBox(format!(
                "latitudes must lie in [-90, 90], got north={} south={}",
                self.north, self.south
            )));
        }
        if self.north < self.south {
            return Err(ConfigurationError::InvalidBoundingBox(format!(
                "north ({}) is south of south ({})",
                self.north, self.south
            )));
        }
        if self.east < self.west {
            return Err(ConfigurationError::InvalidBoundingBox(format!(
                "east ({}) is west of west ({})",
                self.east, self.west
            )));
        }
        if self.north - self.south < Self::MIN_SPAN_DEGREES {
            return Err(ConfigurationError::BoundingBoxTooSmall {
                axis: "latitude",
                span: self.north - self.south,
                minimum: Self::MIN_SPAN_DEGREES,
            });
        }
        if self.east - self.west < Self::MIN_SPAN_DEGREES {
            return Err(ConfigurationError::BoundingBoxTooSmall {
                axis: "longitude",
                span: self.east - self.west,
                minimum: Self::MIN_SPAN_DEGREES,
            });
        }
        Ok(())
    }
}

/// Half-open time window `[beg, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct TimeWindow {
    pub beg: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(beg: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ConfigurationError> {
        if end < beg {
            return Err(ConfigurationError::InvalidDateRange { beg, end });
        }
        Ok(Self { beg, end })
    }

    /// Window covering whole days from `beg` through `end` inclusive
    pub fn from_dates(beg: NaiveDate, end: NaiveDate) -> Result<Self, ConfigurationError> {
        let beg = beg.and_time(chrono::NaiveTime::MIN);
        let end = end.and_time(chrono::NaiveTime::MIN) + Duration::days(1);
        Self::new(beg, end)
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        time >= self.beg && time < self.end
    }
}

/// What to do with stations that fall outside the source grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedPolicy {
    /// Fill those stations with the fill value
    #[default]
    Ignore,
    /// Fail the lookup
    Error,
}

/// Settings for the grid-to-station interpolation stage
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Requested window; `None` processes every available time step
    pub window: Option<TimeWindow>,
    /// Maximum number of time steps regridded at once
    pub chunk_size: usize,
    /// CF standard names to extract
    pub variables: Vec<String>,
    pub unmapped_policy: UnmappedPolicy,
    /// Value written for unmapped stations
    pub fill_value: f64,
    /// Prefix of input and output file names, e.g. `erai`
    pub source: String,
    pub constants: Constants,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            window: None,
            chunk_size: 500,
            variables: vec![
                "air_temperature".to_string(),
                "relative_humidity".to_string(),
                "wind_speed".to_string(),
                "precipitation_amount".to_string(),
                "downwelling_shortwave_flux_in_air".to_string(),
                "downwelling_longwave_flux_in_air".to_string(),
            ],
            unmapped_policy: UnmappedPolicy::Ignore,
            fill_value: -9999.0,
            source: "erai".to_string(),
            constants: Constants::default(),
        }
    }
}

impl InterpolationConfig {
    #[cfg(test)]
    pub fn for_testing(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.chunk_size == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(window) = &self.window {
            if window.end < window.beg {
                return Err(ConfigurationError::InvalidDateRange {
                    beg: window.beg,
                    end: window.end,
                });
            }
        }
        if self.source.is_empty() {
            return Err(ConfigurationError::InvalidParameter {
                name: "source",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for the scaling stage
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Output time step in hours
    pub time_step_hours: f64,
    /// Kernel identifiers in execution order
    pub kernels: Vec<String>,
    /// Tag embedded in output variable names, e.g. `ERAI`
    pub label: String,
    /// Prefix of input and output file names, e.g. `erai`
    pub source: String,
    /// Period after which accumulated forecast fields restart from zero
    pub accumulation_reset_hours: f64,
    pub constants: Constants,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            time_step_hours: 1.0,
            kernels: vec![
                "PRESS_Pa_pl".to_string(),
                "AIRT_C_pl".to_string(),
                "AIRT_C_sur".to_string(),
                "PREC_mm_sur".to_string(),
                "RH_per_sur".to_string(),
                "WIND_sur".to_string(),
                "SW_Wm2_sur".to_string(),
                "LW_Wm2_sur".to_string(),
                "SH_kgkg_sur".to_string(),
                "LW_Wm2_topo".to_string(),
            ],
            label: "ERAI".to_string(),
            source: "erai".to_string(),
            accumulation_reset_hours: 12.0,
            constants: Constants::default(),
        }
    }
}

impl ScalingConfig {
    #[cfg(test)]
    pub fn for_testing(time_step_hours: f64, kernels: &[&str]) -> Self {
        Self {
            time_step_hours,
            kernels: kernels.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Output step in seconds
    pub fn time_step_seconds(&self) -> f64 {
        self.time_step_hours * 3600.0
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.time_step_hours > 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "time_step_hours",
                reason: format!("must be positive, got {}", self.time_step_hours),
            });
        }
        if !(self.accumulation_reset_hours > 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "accumulation_reset_hours",
                reason: format!("must be positive, got {}", self.accumulation_reset_hours),
            });
        }
        if self.kernels.is_empty() {
            return Err(ConfigurationError::InvalidParameter {
                name: "kernels",
                reason: "at least one kernel is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(north: f64, south: f64, west: f64, east: f64) -> BoundingBox {
        BoundingBox {
            north,
            south,
            west,
            east,
        }
    }

    #[test]
    fn test_bounding_box_validation() {
        assert!(bbox(47.0, 45.0, 6.0, 10.0).validate().is_ok());
        assert!(matches!(
            bbox(45.0, 47.0, 6.0, 10.0).validate(),
            Err(ConfigurationError::InvalidBoundingBox(_))
        ));
        assert!(matches!(
            bbox(47.0, 45.0, 10.0, 6.0).validate(),
            Err(ConfigurationError::InvalidBoundingBox(_))
        ));
        assert!(matches!(
            bbox(46.0, 45.0, 6.0, 10.0).validate(),
            Err(ConfigurationError::BoundingBoxTooSmall { axis: "latitude", .. })
        ));
        assert!(matches!(
            bbox(47.0, 45.0, 6.0, 7.0).validate(),
            Err(ConfigurationError::BoundingBoxTooSmall { axis: "longitude", .. })
        ));
        assert!(bbox(95.0, 45.0, 6.0, 10.0).validate().is_err());
    }

    #[test]
    fn test_time_window_from_dates_includes_last_day() {
        let beg = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2010, 1, 2).unwrap();
        let window = TimeWindow::from_dates(beg, end).unwrap();

        let last = NaiveDate::from_ymd_opt(2010, 1, 2)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let next = NaiveDate::from_ymd_opt(2010, 1, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(window.contains(last));
        assert!(!window.contains(next));
    }

    #[test]
    fn test_time_window_rejects_reversed_dates() {
        let beg = NaiveDate::from_ymd_opt(2010, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        assert!(matches!(
            TimeWindow::from_dates(beg, end),
            Err(ConfigurationError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_interpolation_config_validation() {
        assert!(InterpolationConfig::default().validate().is_ok());
        assert!(InterpolationConfig::for_testing(0).validate().is_err());
    }

    #[test]
    fn test_scaling_config_validation() {
        let config = ScalingConfig::for_testing(3.0, &["AIRT_C_sur"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.time_step_seconds(), 10800.0);

        assert!(ScalingConfig::for_testing(0.0, &["AIRT_C_sur"]).validate().is_err());
        assert!(ScalingConfig::for_testing(1.0, &[]).validate().is_err());
    }

    #[test]
    fn test_scaling_config_from_json() {
        let json = r#"{"time_step_hours": 6, "kernels": ["AIRT_C_sur", "RH_per_sur"]}"#;
        let config: ScalingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.time_step_hours, 6.0);
        assert_eq!(config.kernels.len(), 2);
        assert_eq!(config.label, "ERAI");
        assert_eq!(config.constants.gravity, 9.80665);
    }

    #[test]
    fn test_interpolation_config_from_json() {
        let json = r#"{
            "chunk_size": 50,
            "unmapped_policy": "error",
            "window": {"beg": "2010-01-01T00:00:00", "end": "2010-02-01T00:00:00"}
        }"#;
        let config: InterpolationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.unmapped_policy, UnmappedPolicy::Error);
        assert!(config.window.is_some());
        assert_eq!(config.fill_value, -9999.0);
    }
}
