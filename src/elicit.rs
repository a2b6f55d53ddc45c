/*!
# Eliciting auxiliary densities

Helpers for turning a stated credible interval into the parameters of a
Gamma or Normal density. These are used to configure the independence
proposal of the logistic-regression exercise, but nothing in here is
specific to it: the parameters come out as plain values and can be
written down by hand instead.

```rust
use putt_mcmc::elicit::GammaPrior;

// A Gamma density putting 95% of its mass on [2.0, 2.5].
let prior = GammaPrior::from_quantiles(2.0, 2.5, 0.95).unwrap();
assert!((prior.quantile(0.025).unwrap() - 2.0).abs() < 1e-4);
assert!((prior.quantile(0.975).unwrap() - 2.5).abs() < 1e-4);
```
*/

use special::Gamma as _;

use crate::distributions::std_normal_cdf;
use crate::error::{Result, SamplerError};

const BISECTION_STEPS: usize = 200;
const MIN_SHAPE: f64 = 0.05;
const MAX_SHAPE: f64 = 1e5;

/// A Gamma density in the shape/rate parameterisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaPrior {
    pub shape: f64,
    pub rate: f64,
}

impl GammaPrior {
    pub fn new(shape: f64, rate: f64) -> Result<Self> {
        if !(shape.is_finite() && shape > 0.0) {
            return Err(SamplerError::InvalidParameter(format!(
                "Gamma shape must be positive and finite, got {shape}"
            )));
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(SamplerError::InvalidParameter(format!(
                "Gamma rate must be positive and finite, got {rate}"
            )));
        }
        Ok(Self { shape, rate })
    }

    pub fn mean(&self) -> f64 {
        self.shape / self.rate
    }

    pub fn std(&self) -> f64 {
        self.shape.sqrt() / self.rate
    }

    /// Normalised log-density. Returns `-inf` for `x <= 0`.
    pub fn ln_pdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let (ln_gamma_shape, _) = special::Gamma::ln_gamma(self.shape);
        self.shape * self.rate.ln() - ln_gamma_shape + (self.shape - 1.0) * x.ln() - self.rate * x
    }

    /// Regularised lower incomplete gamma function evaluated at `rate * x`.
    pub fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        (self.rate * x).inc_gamma(self.shape)
    }

    /// Inverts [`GammaPrior::cdf`] by bisection on `ln x`.
    pub fn quantile(&self, p: f64) -> Result<f64> {
        if !(p > 0.0 && p < 1.0) {
            return Err(SamplerError::InvalidParameter(format!(
                "Quantile level must lie in (0, 1), got {p}"
            )));
        }
        // Bracket the quantile of the unit-rate density, then rescale.
        let mut hi = self.shape.max(1.0).ln();
        while hi.exp().inc_gamma(self.shape) < p {
            hi += 1.0;
        }
        let mut lo = -700.0_f64;
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if mid.exp().inc_gamma(self.shape) < p {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok((0.5 * (lo + hi)).exp() / self.rate)
    }

    /// Finds the Gamma density whose central `mass` interval is `[lower, upper]`.
    ///
    /// The ratio of two quantiles does not depend on the rate, so the shape is
    /// found first by bisection on that ratio, and the rate then follows from
    /// the lower quantile.
    pub fn from_quantiles(lower: f64, upper: f64, mass: f64) -> Result<Self> {
        if !(lower > 0.0 && upper > lower && upper.is_finite()) {
            return Err(SamplerError::InvalidParameter(format!(
                "Expected 0 < lower < upper, got [{lower}, {upper}]"
            )));
        }
        if !(mass > 0.0 && mass < 1.0) {
            return Err(SamplerError::InvalidParameter(format!(
                "Interval mass must lie in (0, 1), got {mass}"
            )));
        }
        let p_lo = 0.5 * (1.0 - mass);
        let p_hi = 1.0 - p_lo;
        let target_ratio = upper / lower;

        let ratio = |shape: f64| -> Result<f64> {
            let unit = GammaPrior::new(shape, 1.0)?;
            Ok(unit.quantile(p_hi)? / unit.quantile(p_lo)?)
        };

        let (mut lo, mut hi) = (MIN_SHAPE.ln(), MAX_SHAPE.ln());
        if ratio(lo.exp())? < target_ratio || ratio(hi.exp())? > target_ratio {
            return Err(SamplerError::InvalidParameter(format!(
                "No Gamma density with shape in [{MIN_SHAPE}, {MAX_SHAPE}] matches [{lower}, {upper}] at mass {mass}"
            )));
        }
        // The quantile ratio decreases in the shape.
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if ratio(mid.exp())? > target_ratio {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let shape = (0.5 * (lo + hi)).exp();
        let rate = GammaPrior::new(shape, 1.0)?.quantile(p_lo)? / lower;
        log::debug!("Elicited Gamma(shape = {shape:.4}, rate = {rate:.4}) for [{lower}, {upper}]");
        GammaPrior::new(shape, rate)
    }
}

/// Inverse of the standard Normal CDF, by bisection.
pub fn std_normal_quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(SamplerError::InvalidParameter(format!(
            "Quantile level must lie in (0, 1), got {p}"
        )));
    }
    let (mut lo, mut hi) = (-40.0_f64, 40.0_f64);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if std_normal_cdf(mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}

/// Returns `(mean, std)` of the Normal density whose central `mass` interval is `[lower, upper]`.
pub fn normal_from_interval(lower: f64, upper: f64, mass: f64) -> Result<(f64, f64)> {
    if !(upper > lower && lower.is_finite() && upper.is_finite()) {
        return Err(SamplerError::InvalidParameter(format!(
            "Expected a finite interval with lower < upper, got [{lower}, {upper}]"
        )));
    }
    if !(mass > 0.0 && mass < 1.0) {
        return Err(SamplerError::InvalidParameter(format!(
            "Interval mass must lie in (0, 1), got {mass}"
        )));
    }
    let z = std_normal_quantile(0.5 + 0.5 * mass)?;
    Ok((0.5 * (lower + upper), (upper - lower) / (2.0 * z)))
}
