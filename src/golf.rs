/*!
# Golf putting data and models

Aggregated putting data (distance in feet, attempts, successes) and two
posteriors over it:

- [`LogisticPosterior`]: `y_j ~ Binomial(n_j, logit⁻¹(α + β x_j))` with a flat prior.
- [`AngleModelPosterior`]: the geometry-based model in which a putt succeeds when
  the angular error, `Normal(0, σ)`, is smaller than the angle subtended by the
  hole minus the ball, `asin((R - r) / x)`.

```rust
use putt_mcmc::golf::{LogisticPosterior, PuttingData};

let data = PuttingData::new(vec![2.0, 10.0], vec![100, 100], vec![90, 30]).unwrap();
let fit = LogisticPosterior::new(data).mle().unwrap();
assert!(fit.beta < 0.0);
```
*/

use crate::distributions::{std_normal_cdf, Target};
use crate::error::{Result, SamplerError};

/// Ball radius in feet (1.68 in diameter).
pub const BALL_RADIUS: f64 = 1.68 / 2.0 / 12.0;
/// Hole radius in feet (4.25 in diameter).
pub const HOLE_RADIUS: f64 = 4.25 / 2.0 / 12.0;

const NEWTON_MAX_ITER: usize = 100;
const NEWTON_TOL: f64 = 1e-10;

/// Putting attempts aggregated by distance.
#[derive(Debug, Clone, PartialEq)]
pub struct PuttingData {
    /// Distance to the hole, in feet.
    pub distance: Vec<f64>,
    pub attempts: Vec<u64>,
    pub successes: Vec<u64>,
}

impl PuttingData {
    pub fn new(distance: Vec<f64>, attempts: Vec<u64>, successes: Vec<u64>) -> Result<Self> {
        if distance.len() != attempts.len() || distance.len() != successes.len() {
            return Err(SamplerError::Data(format!(
                "Column lengths differ: {} distances, {} attempts, {} successes",
                distance.len(),
                attempts.len(),
                successes.len()
            )));
        }
        if distance.is_empty() {
            return Err(SamplerError::Data("No rows".into()));
        }
        for (i, ((&x, &n), &y)) in distance.iter().zip(&attempts).zip(&successes).enumerate() {
            if !(x.is_finite() && x > 0.0) {
                return Err(SamplerError::Data(format!(
                    "Row {i}: distance must be positive, got {x}"
                )));
            }
            if n == 0 {
                return Err(SamplerError::Data(format!("Row {i}: zero attempts")));
            }
            if y > n {
                return Err(SamplerError::Data(format!(
                    "Row {i}: {y} successes out of {n} attempts"
                )));
            }
        }
        Ok(Self {
            distance,
            attempts,
            successes,
        })
    }

    /// Reads delimited text with a header naming the columns `x`, `n` and `y`.
    #[cfg(feature = "csv")]
    pub fn from_reader<R: std::io::Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| SamplerError::Data(format!("Missing column `{name}`")))
        };
        let (ix, in_, iy) = (column("x")?, column("n")?, column("y")?);

        let mut distance = Vec::new();
        let mut attempts = Vec::new();
        let mut successes = Vec::new();
        for record in rdr.records() {
            let record = record?;
            distance.push(parse_field(&record, ix)?);
            attempts.push(parse_field(&record, in_)?);
            successes.push(parse_field(&record, iy)?);
        }
        log::debug!("Read {} rows of putting data", distance.len());
        Self::new(distance, attempts, successes)
    }

    #[cfg(feature = "csv")]
    pub fn from_path<P: AsRef<std::path::Path>>(path: P, delimiter: u8) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        log::info!("Loading putting data from {}", path.as_ref().display());
        Self::from_reader(file, delimiter)
    }

    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    /// Observed success rate `y / n` at each distance.
    pub fn empirical_rates(&self) -> Vec<f64> {
        self.attempts
            .iter()
            .zip(&self.successes)
            .map(|(&n, &y)| y as f64 / n as f64)
            .collect()
    }

    /// Binomial standard error `sqrt(p (1 - p) / n)` of each empirical rate.
    pub fn standard_errors(&self) -> Vec<f64> {
        self.empirical_rates()
            .iter()
            .zip(&self.attempts)
            .map(|(&p, &n)| (p * (1.0 - p) / n as f64).sqrt())
            .collect()
    }

    fn rows(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.distance
            .iter()
            .zip(&self.attempts)
            .zip(&self.successes)
            .map(|((&x, &n), &y)| (x, n as f64, y as f64))
    }
}

#[cfg(feature = "csv")]
fn parse_field<F>(record: &csv::StringRecord, i: usize) -> Result<F>
where
    F: std::str::FromStr,
    F::Err: std::fmt::Display,
{
    let line = record.position().map_or(0, |p| p.line());
    let raw = record
        .get(i)
        .ok_or_else(|| SamplerError::Data(format!("Line {line}: missing field {i}")))?;
    raw.parse()
        .map_err(|e| SamplerError::Data(format!("Line {line}: cannot parse `{raw}`: {e}")))
}

/// `ln logit⁻¹(η)` without overflow.
fn ln_sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        -(-eta).exp().ln_1p()
    } else {
        eta - eta.exp().ln_1p()
    }
}

/// Binomial log-likelihood of `y` successes in `n` trials with log-probabilities
/// `ln_p` (success) and `ln_q` (failure), skipping terms with zero count.
fn binomial_ll(n: f64, y: f64, ln_p: f64, ln_q: f64) -> f64 {
    let mut ll = 0.0;
    if y > 0.0 {
        ll += y * ln_p;
    }
    if n - y > 0.0 {
        ll += (n - y) * ln_q;
    }
    ll
}

/// Point estimate of the logistic model with standard errors from the observed information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticFit {
    pub alpha: f64,
    pub beta: f64,
    pub alpha_se: f64,
    pub beta_se: f64,
}

/// Posterior of `(α, β)` in the logistic model, under a flat prior.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticPosterior {
    pub data: PuttingData,
}

impl LogisticPosterior {
    pub fn new(data: PuttingData) -> Self {
        Self { data }
    }

    pub fn success_probability(alpha: f64, beta: f64, x: f64) -> f64 {
        ln_sigmoid(alpha + beta * x).exp()
    }

    pub fn log_likelihood(&self, alpha: f64, beta: f64) -> f64 {
        self.data
            .rows()
            .map(|(x, n, y)| {
                let eta = alpha + beta * x;
                binomial_ll(n, y, ln_sigmoid(eta), ln_sigmoid(-eta))
            })
            .sum()
    }

    /// Maximum-likelihood (= posterior mode) estimate by Newton–Raphson.
    pub fn mle(&self) -> Result<LogisticFit> {
        let (mut a, mut b) = (0.0_f64, 0.0_f64);
        for iter in 0..NEWTON_MAX_ITER {
            let (mut ga, mut gb) = (0.0, 0.0);
            let (mut iaa, mut iab, mut ibb) = (0.0, 0.0, 0.0);
            for (x, n, y) in self.data.rows() {
                let p = Self::success_probability(a, b, x);
                let r = y - n * p;
                let w = n * p * (1.0 - p);
                ga += r;
                gb += r * x;
                iaa += w;
                iab += w * x;
                ibb += w * x * x;
            }
            let det = iaa * ibb - iab * iab;
            if !(det.is_finite() && det > 0.0) {
                return Err(SamplerError::InvalidParameter(
                    "Singular information matrix in logistic fit".into(),
                ));
            }
            let da = (ibb * ga - iab * gb) / det;
            let db = (iaa * gb - iab * ga) / det;
            a += da;
            b += db;
            if da.abs().max(db.abs()) < NEWTON_TOL {
                log::debug!("Logistic fit converged after {} iterations", iter + 1);
                return Ok(LogisticFit {
                    alpha: a,
                    beta: b,
                    alpha_se: (ibb / det).sqrt(),
                    beta_se: (iaa / det).sqrt(),
                });
            }
        }
        Err(SamplerError::InvalidParameter(format!(
            "Logistic fit did not converge in {NEWTON_MAX_ITER} iterations"
        )))
    }
}

impl Target<f64, f64> for LogisticPosterior {
    /// `theta = [α, β]`. A state of any other length has no defined density and
    /// reports NaN, which the sampler turns into an error.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        match theta {
            [alpha, beta] => self.log_likelihood(*alpha, *beta),
            _ => f64::NAN,
        }
    }
}

/// Posterior of the angular error `σ` (radians) in the geometry-based model,
/// under a flat prior on `σ > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleModelPosterior {
    pub data: PuttingData,
}

impl AngleModelPosterior {
    pub fn new(data: PuttingData) -> Self {
        Self { data }
    }

    /// Largest angular error that still sinks a putt from `x` feet.
    pub fn threshold_angle(x: f64) -> f64 {
        ((HOLE_RADIUS - BALL_RADIUS) / x).min(1.0).asin()
    }

    /// `2 Φ(asin((R - r) / x) / σ) - 1`
    pub fn success_probability(sigma: f64, x: f64) -> f64 {
        2.0 * std_normal_cdf(Self::threshold_angle(x) / sigma) - 1.0
    }

    pub fn log_likelihood(&self, sigma: f64) -> f64 {
        if !(sigma > 0.0) {
            return f64::NEG_INFINITY;
        }
        self.data
            .rows()
            .map(|(x, n, y)| {
                let z = Self::threshold_angle(x) / sigma;
                let p = 2.0 * std_normal_cdf(z) - 1.0;
                // 1 - p = 2 (1 - Φ(z))
                let q = 2.0 * (1.0 - std_normal_cdf(z)).max(0.0);
                binomial_ll(n, y, p.ln(), q.ln())
            })
            .sum()
    }
}

impl Target<f64, f64> for AngleModelPosterior {
    /// `theta = [σ]`.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        match theta {
            [sigma] => self.log_likelihood(*sigma),
            _ => f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn toy() -> PuttingData {
        PuttingData::new(vec![2.0, 5.0, 10.0], vec![100, 80, 60], vec![95, 50, 15]).unwrap()
    }

    #[test]
    fn rejects_inconsistent_rows() {
        assert!(PuttingData::new(vec![2.0], vec![10, 20], vec![1]).is_err());
        assert!(PuttingData::new(vec![2.0], vec![10], vec![11]).is_err());
        assert!(PuttingData::new(vec![2.0], vec![0], vec![0]).is_err());
        assert!(PuttingData::new(vec![-2.0], vec![10], vec![1]).is_err());
        assert!(PuttingData::new(vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn rates_and_errors() {
        let data = toy();
        assert_eq!(data.empirical_rates(), vec![0.95, 0.625, 0.25]);
        assert_abs_diff_eq!(data.standard_errors()[0], (0.95 * 0.05 / 100.0f64).sqrt());
    }

    #[cfg(feature = "csv")]
    #[test]
    fn reads_space_delimited_text() {
        let text = "x n y\n2 1443 1346\n3 694 577\n";
        let data = PuttingData::from_reader(text.as_bytes(), b' ').unwrap();
        assert_eq!(data.distance, vec![2.0, 3.0]);
        assert_eq!(data.attempts, vec![1443, 694]);
        assert_eq!(data.successes, vec![1346, 577]);

        let reordered = "y,x,n\n5,2,10\n";
        let data = PuttingData::from_reader(reordered.as_bytes(), b',').unwrap();
        assert_eq!((data.distance[0], data.attempts[0], data.successes[0]), (2.0, 10, 5));

        assert!(PuttingData::from_reader("x n\n2 10\n".as_bytes(), b' ').is_err());
        assert!(PuttingData::from_reader("x n y\n2 ten 1\n".as_bytes(), b' ').is_err());
    }

    #[test]
    fn ln_sigmoid_is_stable() {
        assert_abs_diff_eq!(ln_sigmoid(0.0), 0.5f64.ln(), epsilon = 1e-15);
        assert_abs_diff_eq!(ln_sigmoid(-800.0), -800.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ln_sigmoid(800.0), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn mle_is_a_stationary_point() {
        let posterior = LogisticPosterior::new(toy());
        let fit = posterior.mle().unwrap();
        let h = 1e-6;
        let grad_a = (posterior.log_likelihood(fit.alpha + h, fit.beta)
            - posterior.log_likelihood(fit.alpha - h, fit.beta))
            / (2.0 * h);
        let grad_b = (posterior.log_likelihood(fit.alpha, fit.beta + h)
            - posterior.log_likelihood(fit.alpha, fit.beta - h))
            / (2.0 * h);
        assert_abs_diff_eq!(grad_a, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(grad_b, 0.0, epsilon = 1e-4);
        assert!(fit.alpha_se > 0.0 && fit.beta_se > 0.0);
    }

    #[test]
    fn logistic_target_needs_two_parameters() {
        let posterior = LogisticPosterior::new(toy());
        assert!(posterior.unnorm_log_prob(&[1.0]).is_nan());
        assert!(posterior.unnorm_log_prob(&[1.0, -0.1]).is_finite());
    }

    #[test]
    fn angle_model_geometry() {
        // Far away the hole subtends a small angle.
        assert!(AngleModelPosterior::threshold_angle(20.0) < AngleModelPosterior::threshold_angle(2.0));
        let p_close = AngleModelPosterior::success_probability(0.02, 2.0);
        let p_far = AngleModelPosterior::success_probability(0.02, 20.0);
        assert!(p_close > p_far && p_far > 0.0 && p_close < 1.0);

        let posterior = AngleModelPosterior::new(toy());
        assert_eq!(posterior.unnorm_log_prob(&[-0.1]), f64::NEG_INFINITY);
        assert_eq!(posterior.unnorm_log_prob(&[0.0]), f64::NEG_INFINITY);
        assert!(posterior.unnorm_log_prob(&[0.03]).is_finite());
    }
}
