//! Error type shared by the samplers, summaries and data loading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Expected a positive number of iterations, got 0")]
    ZeroIterations,
    #[error("Expected a non-empty initial state")]
    EmptyState,
    #[error("State dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Initial state of chain {chain} lies outside the support of the target (log-density is -inf)")]
    OutsideSupport { chain: usize },
    #[error("Target log-density returned NaN at iteration {iteration}")]
    NanLogDensity { iteration: usize },
    #[error("Proposal log-ratio returned NaN at iteration {iteration}")]
    NanProposalRatio { iteration: usize },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Malformed putting data: {0}")]
    Data(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "csv")]
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Progress(#[from] indicatif::style::TemplateError),
}

pub type Result<T> = std::result::Result<T, SamplerError>;
