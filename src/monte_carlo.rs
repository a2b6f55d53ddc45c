//! Plain Monte Carlo integration.
//!
//! `E[f(X)] ≈ (1/n) Σ f(x_i)` with `x_i` drawn independently, reported with its
//! standard error. [`expectation`] does the same for (correlated) MCMC draws,
//! where the naive standard error is optimistic.

use ndarray::ArrayView2;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{Result, SamplerError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McEstimate {
    pub estimate: f64,
    pub std_error: f64,
    pub n: usize,
}

impl McEstimate {
    fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Result<Self> {
        // Welford
        let (mut n, mut mean, mut m2) = (0usize, 0.0, 0.0);
        for v in values {
            n += 1;
            let delta = v - mean;
            mean += delta / n as f64;
            m2 += delta * (v - mean);
        }
        if n == 0 {
            return Err(SamplerError::ZeroIterations);
        }
        let var = if n > 1 { m2 / (n - 1) as f64 } else { 0.0 };
        Ok(Self {
            estimate: mean,
            std_error: (var / n as f64).sqrt(),
            n,
        })
    }
}

/// Estimates `E[f(X)]` for `X ~ dist` from `n` independent draws.
pub fn integrate<F, D, R>(f: F, dist: &D, n: usize, rng: &mut R) -> Result<McEstimate>
where
    F: Fn(f64) -> f64,
    D: Distribution<f64>,
    R: Rng,
{
    if n == 0 {
        return Err(SamplerError::ZeroIterations);
    }
    McEstimate::from_values(dist.sample_iter(rng).take(n).map(f))
}

/// Estimates `∫_a^b f(x) dx` as `(b - a) E[f(U)]` with `U ~ Uniform(a, b)`.
pub fn integrate_uniform<F, R>(f: F, a: f64, b: f64, n: usize, rng: &mut R) -> Result<McEstimate>
where
    F: Fn(f64) -> f64,
    R: Rng,
{
    if !(a < b && a.is_finite() && b.is_finite()) {
        return Err(SamplerError::InvalidParameter(format!(
            "Expected a finite interval with a < b, got [{a}, {b}]"
        )));
    }
    let width = b - a;
    let est = integrate(f, &Uniform::new(a, b), n, rng)?;
    Ok(McEstimate {
        estimate: est.estimate * width,
        std_error: est.std_error * width,
        n: est.n,
    })
}

/// Posterior expectation of `f(θ)` over the rows of `draws`.
///
/// The standard error treats the draws as independent.
pub fn expectation<F>(draws: ArrayView2<f64>, f: F) -> Result<McEstimate>
where
    F: Fn(&[f64]) -> f64,
{
    McEstimate::from_values(draws.outer_iter().map(|row| match row.as_slice() {
        Some(slice) => f(slice),
        None => f(&row.to_vec()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_distr::Normal;

    #[test]
    fn second_moment_of_standard_normal() {
        let mut rng = SmallRng::seed_from_u64(3);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let est = integrate(|x| x * x, &normal, 100_000, &mut rng).unwrap();
        assert_abs_diff_eq!(est.estimate, 1.0, epsilon = 4.0 * est.std_error);
        assert!(est.std_error < 0.01);
    }

    #[test]
    fn integral_over_interval() {
        let mut rng = SmallRng::seed_from_u64(4);
        // ∫_0^π sin = 2
        let est = integrate_uniform(f64::sin, 0.0, std::f64::consts::PI, 50_000, &mut rng).unwrap();
        assert_abs_diff_eq!(est.estimate, 2.0, epsilon = 0.03);
        assert!(integrate_uniform(f64::sin, 1.0, 1.0, 10, &mut rng).is_err());
        assert!(integrate_uniform(f64::sin, 0.0, 1.0, 0, &mut rng).is_err());
    }

    #[test]
    fn expectation_over_rows() {
        let draws = array![[1.0, 2.0], [3.0, 4.0]];
        let est = expectation(draws.view(), |theta| theta[0] * theta[1]).unwrap();
        assert_abs_diff_eq!(est.estimate, 7.0);
        assert_eq!(est.n, 2);
        let columns = draws.t();
        let est = expectation(columns, |theta| theta[0]).unwrap();
        assert_abs_diff_eq!(est.estimate, 1.5);
    }
}
