use serde::Deserialize;

/// One row of the station table.
///
/// Longitude is normalised to [0, 360) on construction so it matches the
/// longitude convention of the reanalysis grid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Station {
    #[serde(rename = "station_number")]
    pub id: i32,
    #[serde(rename = "station_name")]
    pub name: String,
    #[serde(rename = "latitude_dd")]
    pub latitude: f64,
    #[serde(rename = "longitude_dd", deserialize_with = "deserialize_longitude")]
    pub longitude: f64,
    #[serde(rename = "elevation_m")]
    pub elevation: f64,
    /// Sky-view factor in [0, 1], needed by the topographic longwave kernel
    #[serde(default)]
    pub sky_view: Option<f64>,
}

fn deserialize_longitude<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    f64::deserialize(deserializer).map(normalize_longitude)
}

/// Map any longitude onto [0, 360)
pub fn normalize_longitude(longitude: f64) -> f64 {
    let lon = longitude.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if lon >= 360.0 {
        0.0
    } else {
        lon
    }
}

impl Station {
    pub fn new(id: i32, name: &str, latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            latitude,
            longitude: normalize_longitude(longitude),
            elevation,
            sky_view: None,
        }
    }

    pub fn with_sky_view(mut self, sky_view: f64) -> Self {
        self.sky_view = Some(sky_view);
        self
    }
}

/// Ordered, fixed set of stations. Every station-indexed array in the
/// pipeline follows this order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationSet {
    stations: Vec<Station>,
}

impl StationSet {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Station> {
        self.stations.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    pub fn ids(&self) -> Vec<f64> {
        self.stations.iter().map(|s| s.id as f64).collect()
    }

    pub fn latitudes(&self) -> Vec<f64> {
        self.stations.iter().map(|s| s.latitude).collect()
    }

    pub fn longitudes(&self) -> Vec<f64> {
        self.stations.iter().map(|s| s.longitude).collect()
    }

    pub fn elevations(&self) -> Vec<f64> {
        self.stations.iter().map(|s| s.elevation).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.stations.iter().map(|s| s.name.clone()).collect()
    }

    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        self.stations.iter().map(|s| s.elevation).fold(None, |acc, e| match acc {
            None => Some((e, e)),
            Some((lo, hi)) => Some((lo.min(e), hi.max(e))),
        })
    }
}

impl From<Vec<Station>> for StationSet {
    fn from(stations: Vec<Station>) -> Self {
        Self::new(stations)
    }
}

impl<'a> IntoIterator for &'a StationSet {
    type Item = &'a Station;
    type IntoIter = std::slice::Iter<'a, Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.stations.iter()
    }
}
