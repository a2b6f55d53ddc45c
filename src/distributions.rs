/*!
Target and proposal distributions for the Metropolis–Hastings sampler.

A target only needs to report an unnormalized log-density; a proposal draws
candidates and, when it is not symmetric, reports the Hastings correction.
Both are traits so that the sampler can be generic, and both have closure
adapters ([`FnTarget`], [`FnProposal`]) for quick one-off models.

# Examples

### Continuous Distributions

```rust
use putt_mcmc::distributions::{IsotropicGaussian, Proposal, Target};
use rand::rngs::SmallRng;
use rand::SeedableRng;

// A standard normal target and a random-walk proposal with step size 0.5.
let target = IsotropicGaussian::new(1.0);
let proposal = IsotropicGaussian::new(0.5);

let mut rng = SmallRng::seed_from_u64(42);
let candidate = proposal.sample(&[0.0, 0.0], &mut rng);
let lp: f64 = target.unnorm_log_prob(&candidate);
assert!(lp <= 0.0);
```

### Discrete Distributions

```rust
use putt_mcmc::distributions::{Poisson, Target};

let target = Poisson::new(4.0).unwrap();
let outside: f64 = target.unnorm_log_prob(&[-1]);
let inside: f64 = target.unnorm_log_prob(&[4]);
assert_eq!(outside, f64::NEG_INFINITY);
assert!(inside.is_finite());
```
*/

use num_traits::Float;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

use crate::elicit::GammaPrior;
use crate::error::{Result, SamplerError};

/// A trait for generating proposals in Metropolis–Hastings.
/// The state type `S` is the element type of the parameter vector.
pub trait Proposal<S, T: Float> {
    /// Draws a candidate θ' given the current state θ.
    fn sample<R: Rng>(&self, current: &[S], rng: &mut R) -> Vec<S>;

    /// Returns `log q(current | candidate) - log q(candidate | current)`.
    ///
    /// Symmetric proposals keep the default of zero.
    fn log_ratio(&self, _current: &[S], _candidate: &[S]) -> T {
        T::zero()
    }
}

/// A trait for target distributions from which we want to sample.
pub trait Target<S, T: Float> {
    /// Returns the log of the unnormalized density for state `theta`, or
    /// `-inf` outside the support. Must never return NaN.
    fn unnorm_log_prob(&self, theta: &[S]) -> T;
}

/// A trait for distributions that provide a normalized log-density (e.g., for diagnostics).
pub trait Normalized<S, T: Float> {
    fn log_prob(&self, theta: &[S]) -> T;
}

/// Wraps a closure `Fn(&[S]) -> T` as a [`Target`].
#[derive(Debug, Clone, Copy)]
pub struct FnTarget<F>(pub F);

impl<S, T, F> Target<S, T> for FnTarget<F>
where
    T: Float,
    F: Fn(&[S]) -> T,
{
    fn unnorm_log_prob(&self, theta: &[S]) -> T {
        (self.0)(theta)
    }
}

/// The Hastings correction carried by an [`FnProposal`].
pub trait LogProposalRatio<S, T> {
    fn log_ratio(&self, current: &[S], candidate: &[S]) -> T;
}

/// Marker for a symmetric proposal: the correction is identically zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Symmetric;

impl<S, T: Float> LogProposalRatio<S, T> for Symmetric {
    fn log_ratio(&self, _current: &[S], _candidate: &[S]) -> T {
        T::zero()
    }
}

/// A Hastings correction given as a closure `Fn(current, candidate) -> T`.
#[derive(Debug, Clone, Copy)]
pub struct Hastings<L>(pub L);

impl<S, T, L> LogProposalRatio<S, T> for Hastings<L>
where
    L: Fn(&[S], &[S]) -> T,
{
    fn log_ratio(&self, current: &[S], candidate: &[S]) -> T {
        (self.0)(current, candidate)
    }
}

/**
A proposal assembled from closures.

```rust
use putt_mcmc::distributions::{FnProposal, Proposal};
use rand::{Rng, RngCore, SeedableRng};
use rand::rngs::SmallRng;

// Symmetric uniform random walk.
let walk = FnProposal::new(|x: &[f64], rng: &mut dyn RngCore| {
    x.iter()
        .map(|xi| xi + rng.gen_range(-0.5..0.5_f64))
        .collect::<Vec<f64>>()
});
let mut rng = SmallRng::seed_from_u64(1);
let candidate = Proposal::<f64, f64>::sample(&walk, &[1.0], &mut rng);
assert!((candidate[0] - 1.0).abs() <= 0.5);
let zero: f64 = walk.log_ratio(&[1.0], &candidate);
assert_eq!(zero, 0.0);
```
*/
#[derive(Debug, Clone, Copy)]
pub struct FnProposal<P, L = Symmetric> {
    propose: P,
    log_ratio: L,
}

impl<P> FnProposal<P, Symmetric> {
    pub fn new(propose: P) -> Self {
        Self {
            propose,
            log_ratio: Symmetric,
        }
    }

    /// Attaches a Hastings correction, turning this into an asymmetric proposal.
    pub fn with_log_ratio<L>(self, log_ratio: L) -> FnProposal<P, Hastings<L>> {
        FnProposal {
            propose: self.propose,
            log_ratio: Hastings(log_ratio),
        }
    }
}

impl<S, T, P, L> Proposal<S, T> for FnProposal<P, L>
where
    T: Float,
    P: Fn(&[S], &mut dyn RngCore) -> Vec<S>,
    L: LogProposalRatio<S, T>,
{
    fn sample<R: Rng>(&self, current: &[S], rng: &mut R) -> Vec<S> {
        (self.propose)(current, rng)
    }

    fn log_ratio(&self, current: &[S], candidate: &[S]) -> T {
        self.log_ratio.log_ratio(current, candidate)
    }
}

/**
An isotropic Gaussian distribution.

As a proposal it adds independent Gaussian noise (mean 0, standard deviation
`std`) to each coordinate of the current state, which is symmetric. As a
target it is the zero-mean isotropic Normal with standard deviation `std`;
`IsotropicGaussian::new(1.0)` is the standard Normal.
*/
#[derive(Debug, Clone, Copy)]
pub struct IsotropicGaussian<T: Float> {
    pub std: T,
}

impl<T: Float> IsotropicGaussian<T> {
    /// Creates a new isotropic Gaussian with the specified standard deviation.
    pub fn new(std: T) -> Self {
        Self { std }
    }
}

impl<T: Float> Proposal<T, T> for IsotropicGaussian<T>
where
    rand_distr::StandardNormal: Distribution<T>,
{
    fn sample<R: Rng>(&self, current: &[T], rng: &mut R) -> Vec<T> {
        current
            .iter()
            .map(|&x| {
                let eps: T = rng.sample(rand_distr::StandardNormal);
                x + eps * self.std
            })
            .collect()
    }
}

impl<T: Float> Target<T, T> for IsotropicGaussian<T> {
    fn unnorm_log_prob(&self, theta: &[T]) -> T {
        let sum = theta.iter().fold(T::zero(), |acc, &x| acc + x * x);
        -T::from(0.5).unwrap_or_else(T::zero) * sum / (self.std * self.std)
    }
}

impl<T: Float> Normalized<T, T> for IsotropicGaussian<T> {
    fn log_prob(&self, theta: &[T]) -> T {
        let half = T::from(0.5).unwrap_or_else(T::zero);
        let d = T::from(theta.len()).unwrap_or_else(T::zero);
        let two_pi = T::from(2.0 * PI).unwrap_or_else(T::zero);
        self.unnorm_log_prob(theta) - half * d * (two_pi * self.std * self.std).ln()
    }
}

/// A symmetric random walk on the integers: each coordinate moves by a
/// uniformly chosen non-zero step in `[-max_step, max_step]`.
///
/// It does not know about the support of the target, so it can propose
/// negative values; targets like [`Poisson`] reject those. Steps saturate at
/// the ends of the `i64` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerRandomWalk {
    pub max_step: i64,
}

impl IntegerRandomWalk {
    pub fn new(max_step: i64) -> Result<Self> {
        if max_step < 1 {
            return Err(SamplerError::InvalidParameter(format!(
                "Random-walk step must be at least 1, got {max_step}"
            )));
        }
        Ok(Self { max_step })
    }
}

impl<T: Float> Proposal<i64, T> for IntegerRandomWalk {
    fn sample<R: Rng>(&self, current: &[i64], rng: &mut R) -> Vec<i64> {
        current
            .iter()
            .map(|&x| {
                let magnitude = rng.gen_range(1..=self.max_step);
                if rng.gen_bool(0.5) {
                    x.saturating_add(magnitude)
                } else {
                    x.saturating_sub(magnitude)
                }
            })
            .collect()
    }
}

/// Poisson(λ) as a target over `k = 0, 1, 2, ...`; negative `k` has zero mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Poisson {
    pub lambda: f64,
}

impl Poisson {
    pub fn new(lambda: f64) -> Result<Self> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(SamplerError::InvalidParameter(format!(
                "Poisson rate must be positive and finite, got {lambda}"
            )));
        }
        Ok(Self { lambda })
    }
}

impl<T: Float> Target<i64, T> for Poisson {
    fn unnorm_log_prob(&self, theta: &[i64]) -> T {
        self.log_prob(theta)
    }
}

impl<T: Float> Normalized<i64, T> for Poisson {
    /// `log p(k) = -λ + k ln λ - ln k!`
    fn log_prob(&self, theta: &[i64]) -> T {
        let k = theta[0];
        if k < 0 {
            return T::neg_infinity();
        }
        let kf = k as f64;
        let (ln_factorial, _) = special::Gamma::ln_gamma(kf + 1.0);
        T::from(-self.lambda + kf * self.lambda.ln() - ln_factorial).unwrap_or_else(T::nan)
    }
}

/// The discrete uniform distribution over `low..=high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscreteUniform {
    pub low: i64,
    pub high: i64,
}

impl DiscreteUniform {
    pub fn new(low: i64, high: i64) -> Result<Self> {
        if high < low {
            return Err(SamplerError::InvalidParameter(format!(
                "Empty support: low = {low} > high = {high}"
            )));
        }
        Ok(Self { low, high })
    }
}

impl<T: Float> Target<i64, T> for DiscreteUniform {
    fn unnorm_log_prob(&self, theta: &[i64]) -> T {
        if theta.iter().all(|k| (self.low..=self.high).contains(k)) {
            T::zero()
        } else {
            T::neg_infinity()
        }
    }
}

/**
Independence proposal for the two-parameter `(α, β)` logistic model.

`α'` is drawn from a fixed Gamma density and `β'` from a fixed Normal density,
both ignoring the current state. The Hastings correction is therefore
`log g(θ) - log g(θ')` with `g` the product of the two densities.

```rust
use putt_mcmc::distributions::{GammaNormalIndependence, Proposal};
use putt_mcmc::elicit::GammaPrior;
use rand::SeedableRng;
use rand::rngs::SmallRng;

let alpha = GammaPrior::new(400.0, 180.0).unwrap();
let proposal = GammaNormalIndependence::new(alpha, -0.25, 0.02).unwrap();
let mut rng = SmallRng::seed_from_u64(7);
let candidate = proposal.sample(&[2.2, -0.25], &mut rng);
assert!(candidate[0] > 0.0);
```
*/
#[derive(Debug, Clone, Copy)]
pub struct GammaNormalIndependence {
    pub alpha: GammaPrior,
    pub beta_mean: f64,
    pub beta_std: f64,
    alpha_dist: rand_distr::Gamma<f64>,
    beta_dist: Normal<f64>,
}

impl GammaNormalIndependence {
    pub fn new(alpha: GammaPrior, beta_mean: f64, beta_std: f64) -> Result<Self> {
        let alpha_dist = rand_distr::Gamma::new(alpha.shape, 1.0 / alpha.rate)
            .map_err(|e| SamplerError::InvalidParameter(format!("Gamma proposal: {e}")))?;
        if !(beta_std.is_finite() && beta_std > 0.0) {
            return Err(SamplerError::InvalidParameter(format!(
                "Normal proposal std must be positive and finite, got {beta_std}"
            )));
        }
        let beta_dist = Normal::new(beta_mean, beta_std)
            .map_err(|e| SamplerError::InvalidParameter(format!("Normal proposal: {e}")))?;
        Ok(Self {
            alpha,
            beta_mean,
            beta_std,
            alpha_dist,
            beta_dist,
        })
    }

    fn ln_density(&self, theta: &[f64]) -> f64 {
        let z = (theta[1] - self.beta_mean) / self.beta_std;
        let ln_normal = -0.5 * z * z - self.beta_std.ln() - 0.5 * (2.0 * PI).ln();
        self.alpha.ln_pdf(theta[0]) + ln_normal
    }
}

impl Proposal<f64, f64> for GammaNormalIndependence {
    fn sample<R: Rng>(&self, _current: &[f64], rng: &mut R) -> Vec<f64> {
        vec![self.alpha_dist.sample(rng), self.beta_dist.sample(rng)]
    }

    fn log_ratio(&self, current: &[f64], candidate: &[f64]) -> f64 {
        self.ln_density(current) - self.ln_density(candidate)
    }
}

impl Target<f64, f64> for GammaNormalIndependence {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        self.ln_density(theta)
    }
}

impl Normalized<f64, f64> for GammaNormalIndependence {
    fn log_prob(&self, theta: &[f64]) -> f64 {
        self.ln_density(theta)
    }
}

/// Φ(z), the standard Normal CDF.
pub fn std_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + special::Error::error(z / std::f64::consts::SQRT_2))
}

#[cfg(test)]
mod distributions_tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn iso_gauss_normalized_log_prob() {
        let distr = IsotropicGaussian::new(1.0);
        let p = distr.log_prob(&[1.0]).exp();
        assert_abs_diff_eq!(p, 0.24197072451914337, epsilon = 1e-12);

        let distr = IsotropicGaussian::new(3.0);
        let p = distr.log_prob(&[1.0, 2.0, 3.0]).exp();
        assert_abs_diff_eq!(p, 0.001080393185560214, epsilon = 1e-12);
    }

    #[test]
    fn random_walk_is_symmetric_and_steps() {
        let walk = IntegerRandomWalk::new(2).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..1000 {
            let next = Proposal::<i64, f64>::sample(&walk, &[10], &mut rng);
            let step = (next[0] - 10).abs();
            assert!((1..=2).contains(&step));
        }
        let ratio: f64 = walk.log_ratio(&[10], &[9]);
        assert_eq!(ratio, 0.0);
        assert!(IntegerRandomWalk::new(0).is_err());
    }

    #[test]
    fn random_walk_saturates_at_integer_limits() {
        let walk = IntegerRandomWalk::new(3).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..200 {
            let up = Proposal::<i64, f64>::sample(&walk, &[i64::MAX], &mut rng);
            assert!(up[0] >= i64::MAX - 3);
            let down = Proposal::<i64, f64>::sample(&walk, &[i64::MIN], &mut rng);
            assert!(down[0] <= i64::MIN + 3);
        }
    }

    #[test]
    fn poisson_pmf() {
        let target = Poisson::new(4.0).unwrap();
        // P(k = 2) = e^-4 * 16 / 2
        let expected = (-4.0f64).exp() * 8.0;
        let lp: f64 = target.log_prob(&[2]);
        assert_abs_diff_eq!(lp.exp(), expected, epsilon = 1e-12);
        let outside: f64 = target.unnorm_log_prob(&[-3]);
        assert_eq!(outside, f64::NEG_INFINITY);
        assert!(Poisson::new(0.0).is_err());
    }

    #[test]
    fn discrete_uniform_support() {
        let target = DiscreteUniform::new(1, 3).unwrap();
        let inside: f64 = target.unnorm_log_prob(&[2]);
        let outside: f64 = target.unnorm_log_prob(&[4]);
        assert_eq!(inside, 0.0);
        assert_eq!(outside, f64::NEG_INFINITY);
        assert!(DiscreteUniform::new(3, 1).is_err());
    }

    #[test]
    fn independence_ratio_is_density_difference() {
        let alpha = GammaPrior::new(50.0, 20.0).unwrap();
        let q = GammaNormalIndependence::new(alpha, -0.25, 0.05).unwrap();
        let a = [2.4, -0.2];
        let b = [2.6, -0.3];
        assert_abs_diff_eq!(
            q.log_ratio(&a, &b),
            q.log_prob(&a) - q.log_prob(&b),
            epsilon = 1e-12
        );
        // Outside the Gamma support the density vanishes.
        assert_eq!(q.log_prob(&[-1.0, 0.0]), f64::NEG_INFINITY);
        assert!(GammaNormalIndependence::new(alpha, 0.0, 0.0).is_err());
    }

    #[test]
    fn closure_adapters() {
        let target = FnTarget(|x: &[f64]| -x[0].abs());
        assert_eq!(target.unnorm_log_prob(&[-2.0]), -2.0);

        let proposal = FnProposal::new(|x: &[f64], _rng: &mut dyn RngCore| vec![x[0] + 1.0])
            .with_log_ratio(|cur: &[f64], cand: &[f64]| cand[0] - cur[0]);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(proposal.sample(&[1.0], &mut rng), vec![2.0]);
        assert_eq!(proposal.log_ratio(&[1.0], &[2.0]), 1.0);
    }

    #[test]
    fn normal_cdf_reference_values() {
        assert_abs_diff_eq!(std_normal_cdf(0.0), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(std_normal_cdf(1.96), 0.9750021048517795, epsilon = 1e-9);
    }
}
