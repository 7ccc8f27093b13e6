use crate::builder::BuildError;
use crate::config::ConfigurationError;
use crate::grid::GridError;
use crate::io::StoreError;
use crate::regrid::RegridError;
use crate::scaling::ScalingError;
use crate::series::SeriesError;
use crate::time_utils::TimeError;
use crate::vertical::VerticalError;
use thiserror::Error;

/// Any failure of a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Regrid(#[from] RegridError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Vertical(#[from] VerticalError),

    #[error(transparent)]
    Scaling(#[from] ScalingError),

    #[error(transparent)]
    Time(#[from] TimeError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
