use crate::config::Constants;

/// Standard pressure levels (hPa) distributed by the reanalysis archive
pub const STANDARD_PRESSURE_LEVELS: [f64; 20] = [
    300.0, 350.0, 400.0, 450.0, 500.0, 550.0, 600.0, 650.0, 700.0, 750.0, 775.0, 800.0, 825.0,
    850.0, 875.0, 900.0, 925.0, 950.0, 975.0, 1000.0,
];

/// Margin (hPa) added around the station pressure range when picking levels
pub const PRESSURE_LEVEL_MARGIN: f64 = 55.0;

/// Geopotential (m²/s²) to geopotential height (m)
pub fn geopotential_height(geopotential: f64, constants: &Constants) -> f64 {
    geopotential / constants.gravity
}

/// Barometric formula: standard-atmosphere pressure (hPa) at `elevation` (m)
pub fn barometric_pressure(elevation: f64, constants: &Constants) -> f64 {
    let exponent = -constants.gravity * constants.molar_mass_air * elevation
        / (constants.gas_constant * constants.t0);
    constants.p0 * exponent.exp() / 100.0
}

/// Standard pressure levels needed to bracket stations between
/// `min_elevation` and `max_elevation`, ordered from high to low altitude
pub fn pressure_levels_for_elevations(
    min_elevation: f64,
    max_elevation: f64,
    constants: &Constants,
) -> Vec<f64> {
    let p_top = barometric_pressure(max_elevation, constants) - PRESSURE_LEVEL_MARGIN;
    let p_bottom = barometric_pressure(min_elevation, constants) + PRESSURE_LEVEL_MARGIN;
    STANDARD_PRESSURE_LEVELS
        .iter()
        .copied()
        .filter(|&p| p >= p_top && p <= p_bottom)
        .collect()
}

pub fn kelvin_to_celsius(temperature: f64, constants: &Constants) -> f64 {
    temperature - constants.zero_celsius
}

/// Relative humidity (%) from the dew-point depression, clamped to [0.1, 99.9]
pub fn relative_humidity_from_dewpoint(temperature: f64, dewpoint: f64) -> f64 {
    (100.0 - 5.0 * (temperature - dewpoint)).clamp(0.1, 99.9)
}

/// Saturation vapour pressure over water (hPa), Magnus form; temperature in °C
pub fn saturation_vapour_pressure(temperature_c: f64) -> f64 {
    6.112 * (17.67 * temperature_c / (temperature_c + 243.5)).exp()
}

/// Specific humidity (kg/kg) from dew point (°C) and air pressure (Pa)
pub fn specific_humidity(dewpoint_c: f64, pressure_pa: f64) -> f64 {
    let e = saturation_vapour_pressure(dewpoint_c);
    let p = pressure_pa / 100.0;
    0.622 * e / (p - 0.378 * e)
}

pub fn wind_speed(u: f64, v: f64) -> f64 {
    (u * u + v * v).sqrt()
}

/// Meteorological wind direction (degrees the wind blows from, [0, 360))
pub fn wind_direction(u: f64, v: f64) -> f64 {
    let deg = (-u).atan2(-v).to_degrees();
    let deg = deg.rem_euclid(360.0);
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

/// Incoming longwave radiation (W/m²) corrected for terrain.
///
/// Clear-sky emissivity after Konzelmann et al. (1994) as used by
/// Fiddes & Gruber (2014); the part of the hemisphere hidden by terrain
/// radiates as a black body at air temperature.
pub fn longwave_downward(
    relative_humidity: f64,
    temperature_k: f64,
    sky_view: f64,
    constants: &Constants,
) -> f64 {
    const X1: f64 = 0.43;
    const X2: f64 = 5.7;

    let vapour_pa = relative_humidity / 100.0
        * saturation_vapour_pressure(temperature_k - constants.zero_celsius)
        * 100.0;
    let emissivity = 0.23 + X1 * (vapour_pa / temperature_k).powf(1.0 / X2);
    let black_body = constants.stefan_boltzmann * temperature_k.powi(4);
    sky_view * emissivity * black_body + (1.0 - sky_view) * black_body
}
