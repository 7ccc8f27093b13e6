use super::{KernelContext, ScalingError, SourceKind};
use crate::math::{
    kelvin_to_celsius, longwave_downward, relative_humidity_from_dewpoint, specific_humidity,
    wind_direction, wind_speed,
};
use ndarray::{Array2, Zip};
use std::collections::BTreeMap;

/// Metadata of the variable a kernel writes
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub standard_name: String,
}

impl OutputSpec {
    fn new(name: String, long_name: &str, units: &str, standard_name: &str) -> Self {
        Self {
            name,
            long_name: long_name.to_string(),
            units: units.to_string(),
            standard_name: standard_name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum KernelOutput {
    /// `[time, station]` values on the output grid
    Series(Array2<f64>),
    /// Nothing computed; the reason is reported
    NoOp { reason: String },
}

/// A derived output variable
pub trait Kernel {
    /// Registry identifier, e.g. `AIRT_C_sur`
    fn name(&self) -> &str;

    /// Identifiers of kernels whose output this one reads
    fn requires(&self) -> &[&'static str] {
        &[]
    }

    /// Variable written for this kernel; `None` for placeholders
    fn output(&self) -> Option<&OutputSpec>;

    fn compute(&self, ctx: &KernelContext<'_>) -> Result<KernelOutput, ScalingError>;
}

#[derive(Debug, Clone, Copy)]
enum Sampling {
    Instantaneous,
    /// Accumulated amount per output step, divided by the step when `per_second`
    Accumulated { per_second: bool },
}

/// Single source variable with a pointwise unit conversion
struct Conversion {
    id: &'static str,
    output: OutputSpec,
    source: SourceKind,
    variable: &'static str,
    sampling: Sampling,
    convert: fn(f64, &KernelContext<'_>) -> f64,
}

impl Kernel for Conversion {
    fn name(&self) -> &str {
        self.id
    }

    fn output(&self) -> Option<&OutputSpec> {
        Some(&self.output)
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> Result<KernelOutput, ScalingError> {
        let mut values = match self.sampling {
            Sampling::Instantaneous => ctx.instantaneous(self.source, self.variable)?,
            Sampling::Accumulated { per_second } => {
                let mut amount = ctx.accumulated(self.source, self.variable)?;
                if per_second {
                    let step = ctx.step_seconds();
                    amount.mapv_inplace(|v| v / step);
                }
                amount
            }
        };
        values.mapv_inplace(|v| (self.convert)(v, ctx));
        Ok(KernelOutput::Series(values))
    }
}

struct RelativeHumidity {
    output: OutputSpec,
}

impl Kernel for RelativeHumidity {
    fn name(&self) -> &str {
        "RH_per_sur"
    }

    fn requires(&self) -> &[&'static str] {
        &["AIRT_C_sur"]
    }

    fn output(&self) -> Option<&OutputSpec> {
        Some(&self.output)
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> Result<KernelOutput, ScalingError> {
        let temperature = ctx.output("AIRT_C_sur")?;
        let dewpoint = ctx.instantaneous(SourceKind::SurfaceAnalysis, "d2m")?;
        let zero = ctx.constants().zero_celsius;
        let rh = Zip::from(temperature)
            .and(&dewpoint)
            .map_collect(|&t, &td| relative_humidity_from_dewpoint(t, td - zero));
        Ok(KernelOutput::Series(rh))
    }
}

#[derive(Clone, Copy)]
enum WindComponent {
    Speed,
    Direction,
}

struct Wind {
    id: &'static str,
    component: WindComponent,
    output: OutputSpec,
}

impl Kernel for Wind {
    fn name(&self) -> &str {
        self.id
    }

    fn output(&self) -> Option<&OutputSpec> {
        Some(&self.output)
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> Result<KernelOutput, ScalingError> {
        let u = ctx.instantaneous(SourceKind::SurfaceAnalysis, "u10")?;
        let v = ctx.instantaneous(SourceKind::SurfaceAnalysis, "v10")?;
        let f = match self.component {
            WindComponent::Speed => wind_speed,
            WindComponent::Direction => wind_direction,
        };
        Ok(KernelOutput::Series(
            Zip::from(&u).and(&v).map_collect(|&u, &v| f(u, v)),
        ))
    }
}

struct SpecificHumidity {
    output: OutputSpec,
}

impl Kernel for SpecificHumidity {
    fn name(&self) -> &str {
        "SH_kgkg_sur"
    }

    fn requires(&self) -> &[&'static str] {
        &["PRESS_Pa_pl"]
    }

    fn output(&self) -> Option<&OutputSpec> {
        Some(&self.output)
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> Result<KernelOutput, ScalingError> {
        let pressure = ctx.output("PRESS_Pa_pl")?;
        let dewpoint = ctx.instantaneous(SourceKind::SurfaceAnalysis, "d2m")?;
        let constants = ctx.constants();
        let q = Zip::from(&dewpoint)
            .and(pressure)
            .map_collect(|&td, &p| specific_humidity(kelvin_to_celsius(td, constants), p));
        Ok(KernelOutput::Series(q))
    }
}

struct TopographicLongwave {
    output: OutputSpec,
}

impl Kernel for TopographicLongwave {
    fn name(&self) -> &str {
        "LW_Wm2_topo"
    }

    fn requires(&self) -> &[&'static str] {
        &["RH_per_sur", "AIRT_C_sur"]
    }

    fn output(&self) -> Option<&OutputSpec> {
        Some(&self.output)
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> Result<KernelOutput, ScalingError> {
        let sky_view: Vec<f64> = ctx
            .stations()
            .iter()
            .map(|s| {
                s.sky_view.ok_or_else(|| ScalingError::MissingStationAttribute {
                    kernel: self.name().to_string(),
                    station: s.id,
                    attribute: "sky_view",
                })
            })
            .collect::<Result<_, _>>()?;
        let rh = ctx.output("RH_per_sur")?;
        let temperature = ctx.output("AIRT_C_sur")?;
        let constants = ctx.constants();

        let mut lw = Array2::zeros(rh.raw_dim());
        Zip::indexed(&mut lw)
            .and(rh)
            .and(temperature)
            .for_each(|(_, s), out, &rh, &t| {
                *out = longwave_downward(rh, t + constants.zero_celsius, sky_view[s], constants);
            });
        Ok(KernelOutput::Series(lw))
    }
}

/// Temperature downscaling that needs the pressure-level profile; not
/// available in this pipeline
struct RedcappPlaceholder;

impl Kernel for RedcappPlaceholder {
    fn name(&self) -> &str {
        "AIRT_redcapp"
    }

    fn output(&self) -> Option<&OutputSpec> {
        None
    }

    fn compute(&self, _ctx: &KernelContext<'_>) -> Result<KernelOutput, ScalingError> {
        Ok(KernelOutput::NoOp {
            reason: "REDCAPP air temperature is not implemented".to_string(),
        })
    }
}

type KernelFactory = fn(&str) -> Box<dyn Kernel>;

/// Identifier to kernel constructor, plus aliases that expand to several
/// kernels
pub struct KernelRegistry {
    factories: BTreeMap<&'static str, KernelFactory>,
    aliases: BTreeMap<&'static str, Vec<&'static str>>,
}

fn out_name(quantity: &str, label: &str, suffix: &str) -> String {
    format!("{}_{}_{}", quantity, label, suffix)
}

impl KernelRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Every kernel the pipeline knows about
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("PRESS_Pa_pl", |label| {
            Box::new(Conversion {
                id: "PRESS_Pa_pl",
                output: OutputSpec::new(
                    out_name("PRESS", label, "Pa_pl"),
                    "air pressure interpolated from pressure levels",
                    "Pa",
                    "air_pressure",
                ),
                source: SourceKind::PressureLevel,
                variable: "air_pressure",
                sampling: Sampling::Instantaneous,
                convert: |hpa, _| hpa * 100.0,
            })
        });
        registry.register("AIRT_C_pl", |label| {
            Box::new(Conversion {
                id: "AIRT_C_pl",
                output: OutputSpec::new(
                    out_name("AIRT", label, "C_pl"),
                    "air temperature interpolated from pressure levels",
                    "degree_Celsius",
                    "air_temperature",
                ),
                source: SourceKind::PressureLevel,
                variable: "t",
                sampling: Sampling::Instantaneous,
                convert: |k, ctx| kelvin_to_celsius(k, ctx.constants()),
            })
        });
        registry.register("AIRT_C_sur", |label| {
            Box::new(Conversion {
                id: "AIRT_C_sur",
                output: OutputSpec::new(
                    out_name("AIRT", label, "C_sur"),
                    "2 metre air temperature",
                    "degree_Celsius",
                    "air_temperature",
                ),
                source: SourceKind::SurfaceAnalysis,
                variable: "t2m",
                sampling: Sampling::Instantaneous,
                convert: |k, ctx| kelvin_to_celsius(k, ctx.constants()),
            })
        });
        registry.register("AIRT_redcapp", |_| Box::new(RedcappPlaceholder));
        registry.register("PREC_mm_sur", |label| {
            Box::new(Conversion {
                id: "PREC_mm_sur",
                output: OutputSpec::new(
                    out_name("PREC", label, "mm_sur"),
                    "total precipitation per time step",
                    "mm",
                    "precipitation_amount",
                ),
                source: SourceKind::SurfaceForecast,
                variable: "tp",
                sampling: Sampling::Accumulated { per_second: false },
                convert: |m, _| m * 1000.0,
            })
        });
        registry.register("RH_per_sur", |label| {
            Box::new(RelativeHumidity {
                output: OutputSpec::new(
                    out_name("RH", label, "per_sur"),
                    "2 metre relative humidity",
                    "percent",
                    "relative_humidity",
                ),
            })
        });
        registry.register("WSPD_ms_sur", |label| {
            Box::new(Wind {
                id: "WSPD_ms_sur",
                component: WindComponent::Speed,
                output: OutputSpec::new(
                    out_name("WSPD", label, "ms_sur"),
                    "10 metre wind speed",
                    "m s-1",
                    "wind_speed",
                ),
            })
        });
        registry.register("WDIR_deg_sur", |label| {
            Box::new(Wind {
                id: "WDIR_deg_sur",
                component: WindComponent::Direction,
                output: OutputSpec::new(
                    out_name("WDIR", label, "deg_sur"),
                    "10 metre wind direction",
                    "degree",
                    "wind_from_direction",
                ),
            })
        });
        registry.alias("WIND_sur", &["WSPD_ms_sur", "WDIR_deg_sur"]);
        registry.register("SW_Wm2_sur", |label| {
            Box::new(Conversion {
                id: "SW_Wm2_sur",
                output: OutputSpec::new(
                    out_name("SW", label, "Wm2_sur"),
                    "surface downwelling shortwave radiation",
                    "W m-2",
                    "surface_downwelling_shortwave_flux_in_air",
                ),
                source: SourceKind::SurfaceForecast,
                variable: "ssrd",
                sampling: Sampling::Accumulated { per_second: true },
                convert: |v, _| v,
            })
        });
        registry.register("LW_Wm2_sur", |label| {
            Box::new(Conversion {
                id: "LW_Wm2_sur",
                output: OutputSpec::new(
                    out_name("LW", label, "Wm2_sur"),
                    "surface downwelling longwave radiation",
                    "W m-2",
                    "surface_downwelling_longwave_flux_in_air",
                ),
                source: SourceKind::SurfaceForecast,
                variable: "strd",
                sampling: Sampling::Accumulated { per_second: true },
                convert: |v, _| v,
            })
        });
        registry.register("SH_kgkg_sur", |label| {
            Box::new(SpecificHumidity {
                output: OutputSpec::new(
                    out_name("SH", label, "kgkg_sur"),
                    "2 metre specific humidity",
                    "1",
                    "specific_humidity",
                ),
            })
        });
        registry.register("LW_Wm2_topo", |label| {
            Box::new(TopographicLongwave {
                output: OutputSpec::new(
                    out_name("LW", label, "Wm2_topo"),
                    "surface downwelling longwave radiation corrected for terrain",
                    "W m-2",
                    "surface_downwelling_longwave_flux_in_air",
                ),
            })
        });
        registry
    }

    pub fn register(&mut self, id: &'static str, factory: KernelFactory) {
        self.factories.insert(id, factory);
    }

    pub fn alias(&mut self, id: &'static str, expands_to: &[&'static str]) {
        self.aliases.insert(id, expands_to.to_vec());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id) || self.aliases.contains_key(id)
    }

    /// Instantiate `ids` in order, expanding aliases, and check that every
    /// kernel's requirements are produced by an earlier kernel
    pub fn resolve(&self, ids: &[String], label: &str) -> Result<Vec<Box<dyn Kernel>>, ScalingError> {
        let mut expanded: Vec<&str> = Vec::new();
        for id in ids {
            match self.aliases.get(id.as_str()) {
                Some(targets) => expanded.extend(targets.iter().copied()),
                None => expanded.push(id.as_str()),
            }
        }

        let mut kernels: Vec<Box<dyn Kernel>> = Vec::with_capacity(expanded.len());
        for id in expanded {
            let factory = self
                .factories
                .get(id)
                .ok_or_else(|| ScalingError::UnknownKernel(id.to_string()))?;
            let kernel = factory(label);
            for &required in kernel.requires() {
                if !kernels.iter().any(|k| k.name() == required) {
                    return Err(ScalingError::KernelOrder {
                        kernel: id.to_string(),
                        requires: required.to_string(),
                    });
                }
            }
            kernels.push(kernel);
        }
        Ok(kernels)
    }
}
