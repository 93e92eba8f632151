use thiserror::Error;

use crate::model::SourceId;

pub type ChartResult<T> = Result<T, ChartError>;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("invalid interval: left={left} is greater than right={right}")]
    InvalidInterval { left: f64, right: f64 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("invalid tick base {0}: expected a non-negative product of 2s and 5s")]
    InvalidTickBase(f64),

    #[error("unknown price source: {0:?}")]
    UnknownSource(SourceId),

    #[error("malformed options json: {0}")]
    OptionsJson(#[from] serde_json::Error),
}
