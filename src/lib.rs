pub mod builder;
pub mod config;
pub mod error;
pub mod grid;
pub mod io;
pub mod math;
#[cfg(feature = "netcdf")]
pub mod pipeline;
pub mod regrid;
pub mod scaling;
pub mod series;
pub mod station;
pub mod time_utils;
pub mod variables;
pub mod vertical;

pub use error::PipelineError;
pub use time_utils::*;
