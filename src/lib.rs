//! Metropolis–Hastings sampling for the golf-putting Bayesian modelling exercises.
//!
//! - [`metropolis_hastings`]: the sampler engine (single runs and parallel chains).
//! - [`distributions`]: target and proposal traits, closure adapters and the
//!   exercise distributions.
//! - [`golf`]: putting data and the logistic / angle-model posteriors.
//! - [`stats`], [`monte_carlo`], [`elicit`], [`io`]: summaries, Monte Carlo
//!   integration, auxiliary-density elicitation and CSV output.

pub mod core;
pub mod distributions;
pub mod elicit;
pub mod error;
pub mod golf;
#[cfg(feature = "csv")]
pub mod io;
pub mod metropolis_hastings;
pub mod monte_carlo;
pub mod stats;

pub use error::{Result, SamplerError};
