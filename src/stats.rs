//! Summary statistics and convergence diagnostics for MCMC draws.

use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_stats::QuantileExt;
use num_traits::ToPrimitive;
use rustfft::{num_complex::Complex, FftPlanner};
use std::collections::{BTreeMap, VecDeque};

use crate::error::{Result, SamplerError};

const ACCEPT_WINDOW: usize = 100;

/// Online per-parameter mean/variance and a windowed acceptance rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n_params: usize,
    n: u64,
    p_accept: f64,
    mean: Array1<f64>, // n_params
    m2: Array1<f64>,   // n_params
    accept_queue: VecDeque<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n: u64,
    pub p_accept: f64,
    pub mean: Array1<f64>, // n_params
    pub sm2: Array1<f64>,  // n_params
}

impl ChainTracker {
    pub fn new(n_params: usize) -> Self {
        Self {
            n_params,
            n: 0,
            p_accept: 0.0,
            mean: Array1::zeros(n_params),
            m2: Array1::zeros(n_params),
            accept_queue: VecDeque::with_capacity(ACCEPT_WINDOW + 1),
        }
    }

    pub fn step<S: ToPrimitive>(&mut self, x: &[S], accepted: bool) -> Result<()> {
        if x.len() != self.n_params {
            return Err(SamplerError::DimensionMismatch {
                expected: self.n_params,
                found: x.len(),
            });
        }
        self.n += 1;

        self.accept_queue.push_back(accepted);
        if self.accept_queue.len() > ACCEPT_WINDOW {
            self.accept_queue.pop_front();
        }
        let n_accepted = self.accept_queue.iter().filter(|&&a| a).count();
        self.p_accept = n_accepted as f64 / self.accept_queue.len() as f64;

        // Welford update
        let n = self.n as f64;
        for (i, xi) in x.iter().enumerate() {
            let xi = xi.to_f64().unwrap_or(f64::NAN);
            let delta = xi - self.mean[i];
            self.mean[i] += delta / n;
            self.m2[i] += delta * (xi - self.mean[i]);
        }
        Ok(())
    }

    /// Acceptance rate over the last 100 steps.
    pub fn p_accept(&self) -> f64 {
        self.p_accept
    }

    /// Unbiased sample variance per parameter.
    pub fn sm2(&self) -> Array1<f64> {
        if self.n < 2 {
            return Array1::zeros(self.n_params);
        }
        &self.m2 / (self.n as f64 - 1.0)
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            n: self.n,
            p_accept: self.p_accept,
            mean: self.mean.clone(),
            sm2: self.sm2(),
        }
    }
}

/// Posterior summary of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub mean: f64,
    pub sd: f64,
    /// `(probability, value)` pairs, in the order requested.
    pub quantiles: Vec<(f64, f64)>,
}

/// Linear-interpolation quantile of `values` (which need not be sorted).
pub fn quantile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(SamplerError::InvalidParameter(
            "Cannot take a quantile of no values".into(),
        ));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(SamplerError::InvalidParameter(format!(
            "Quantile level must lie in [0, 1], got {q}"
        )));
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Ok(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Summarises each column of `draws` (shape `samples × params`).
pub fn summarize(draws: ArrayView2<f64>, probs: &[f64]) -> Result<Vec<ParamSummary>> {
    if draws.nrows() == 0 {
        return Err(SamplerError::ZeroIterations);
    }
    draws
        .axis_iter(Axis(1))
        .map(|column| -> Result<ParamSummary> {
            let values = column.to_vec();
            let mean = column.mean().unwrap_or(f64::NAN);
            let sd = if values.len() > 1 { column.std(1.0) } else { 0.0 };
            let quantiles = probs
                .iter()
                .map(|&p| quantile(&values, p).map(|v| (p, v)))
                .collect::<Result<Vec<_>>>()?;
            Ok(ParamSummary {
                mean,
                sd,
                quantiles,
            })
        })
        .collect()
}

/// Converts integer (or any numeric) draws to `f64` for the summaries.
pub fn to_f64<S: ToPrimitive>(samples: &Array3<S>) -> Array3<f64> {
    samples.map(|x| x.to_f64().unwrap_or(f64::NAN))
}

/// Pools all chains of `samples` (shape `chains × samples × params`) into one matrix.
pub fn pool(samples: ArrayView3<f64>) -> Result<Array2<f64>> {
    let (c, n, d) = samples.dim();
    Ok(Array2::from_shape_vec((c * n, d), samples.iter().copied().collect())?)
}

/// Empirical frequency of each value of a discrete chain.
pub fn frequencies(values: &[i64]) -> BTreeMap<i64, f64> {
    let mut counts = BTreeMap::new();
    for &v in values {
        *counts.entry(v).or_insert(0usize) += 1;
    }
    let total = values.len() as f64;
    counts
        .into_iter()
        .map(|(k, c)| (k, c as f64 / total))
        .collect()
}

/// Split R-hat for each parameter of `samples` (shape `chains × samples × params`).
///
/// Every chain is cut in half so that a single drifting chain is caught too.
/// Chains that never move from a shared value report 1.
pub fn split_rhat(samples: ArrayView3<f64>) -> Result<Array1<f64>> {
    let (n_chains, n, n_params) = samples.dim();
    let half = n / 2;
    if n_chains == 0 || half < 2 {
        return Err(SamplerError::InvalidParameter(format!(
            "Split R-hat needs at least 4 draws per chain, got {n}"
        )));
    }
    let m = 2 * n_chains;
    let halves: Vec<ArrayView2<f64>> = samples
        .axis_iter(Axis(0))
        .flat_map(|chain| {
            let (first, second) = chain.split_at(Axis(0), half);
            [first, second.slice_move(s![..half, ..])]
        })
        .collect();

    let mut means = Array2::<f64>::zeros((m, n_params));
    let mut vars = Array2::<f64>::zeros((m, n_params));
    for (j, h) in halves.iter().enumerate() {
        for p in 0..n_params {
            let col = h.column(p);
            means[[j, p]] = col.mean().unwrap_or(f64::NAN);
            vars[[j, p]] = col.var(1.0);
        }
    }

    let nf = half as f64;
    let within = vars.mean_axis(Axis(0)).ok_or(SamplerError::ZeroIterations)?;
    let between = means.var_axis(Axis(0), 1.0) * nf;
    let var_plus = &within * ((nf - 1.0) / nf) + &between / nf;
    // Chains stuck on one common value carry no evidence of disagreement.
    let rhat = Zip::from(&var_plus)
        .and(&within)
        .map_collect(|&v, &w| if v == 0.0 && w == 0.0 { 1.0 } else { (v / w).sqrt() });
    log::debug!("Split R-hat: {rhat}, max {:?}", rhat.max().ok());
    Ok(rhat)
}

/// Autocovariance at every lag, computed through the FFT.
fn autocovariance(x: ArrayView1<f64>) -> Vec<f64> {
    let n = x.len();
    let mean = x.mean().unwrap_or(0.0);
    let size = (2 * n).next_power_of_two();
    let mut buffer: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex::new(v - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(size).process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(size).process(&mut buffer);

    buffer[..n]
        .iter()
        .map(|c| c.re / (size as f64 * n as f64))
        .collect()
}

/// Multi-chain effective sample size per parameter, using Geyer's initial
/// monotone sequence estimator on the combined autocorrelation.
pub fn ess(samples: ArrayView3<f64>) -> Result<Array1<f64>> {
    let (n_chains, n, n_params) = samples.dim();
    if n_chains == 0 || n < 4 {
        return Err(SamplerError::InvalidParameter(format!(
            "ESS needs at least 4 draws per chain, got {n}"
        )));
    }
    let nf = n as f64;
    let mut out = Array1::<f64>::zeros(n_params);

    for p in 0..n_params {
        let acovs: Vec<Vec<f64>> = (0..n_chains)
            .map(|c| autocovariance(samples.slice(s![c, .., p])))
            .collect();
        let chain_means: Array1<f64> = (0..n_chains)
            .map(|c| samples.slice(s![c, .., p]).mean().unwrap_or(f64::NAN))
            .collect();
        let mean_var = acovs.iter().map(|a| a[0] * nf / (nf - 1.0)).sum::<f64>() / n_chains as f64;
        let between = if n_chains > 1 {
            chain_means.var(1.0)
        } else {
            0.0
        };
        let var_plus = mean_var * (nf - 1.0) / nf + between;
        if var_plus <= 0.0 {
            // Constant chain: no information beyond a single draw.
            out[p] = 1.0;
            continue;
        }

        let rho = |t: usize| -> f64 {
            let mean_acov = acovs.iter().map(|a| a[t]).sum::<f64>() / n_chains as f64;
            1.0 - (mean_var - mean_acov) / var_plus
        };

        // Sum consecutive pairs while positive, keeping the sequence monotone.
        let mut tau = 0.0;
        let mut prev_pair = f64::INFINITY;
        let mut t = 0;
        while t + 1 < n {
            let pair = (rho(t) + rho(t + 1)).min(prev_pair);
            if pair <= 0.0 {
                break;
            }
            tau += pair;
            prev_pair = pair;
            t += 2;
        }
        let tau = (2.0 * tau - 1.0).max(1.0 / (n_chains as f64 * nf).log10());
        out[p] = n_chains as f64 * nf / tau;
    }
    Ok(out)
}
