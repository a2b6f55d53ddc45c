/*!
# Metropolis–Hastings Sampler

This module implements a generic Metropolis–Hastings sampler that works with any
target distribution `D` and proposal distribution `Q` implementing [`Target`] and
[`Proposal`].

## Overview

- **Target Distribution (`D`)**: Provides the (unnormalized) log-density via [`Target`].
  Points outside the support report `-inf` and are always rejected.
- **Proposal Distribution (`Q`)**: Generates candidate states and, for asymmetric
  proposals, the Hastings correction via [`Proposal::log_ratio`].
- **Single runs**: [`metropolis_hastings`] runs one chain with a caller-supplied RNG
  and returns a [`Trace`] with the draws and the number of accepted proposals.
- **Parallel Chains**: [`MetropolisHastings`] keeps a vector of [`MHMarkovChain`]s
  and runs them with [`ChainRunner`](crate::core::ChainRunner).
- **Reproducibility**: `set_seed` gives chain `i` the seed `seed + i`.

## Example Usage

```rust
use putt_mcmc::core::ChainRunner;
use putt_mcmc::distributions::IsotropicGaussian;
use putt_mcmc::metropolis_hastings::MetropolisHastings;

// Standard normal target, random-walk proposal with step size 1.
let target = IsotropicGaussian::new(1.0);
let proposal = IsotropicGaussian::new(1.0);

let mut mh = MetropolisHastings::new(target, proposal, vec![vec![0.0]; 4])
    .unwrap()
    .set_seed(42);
let samples = mh.run(1_000, 100).unwrap();
assert_eq!(samples.shape(), &[4, 1_000, 1]);
```
*/

use ndarray::Array2;
use num_traits::Float;
use rand::prelude::*;
use std::marker::PhantomData;

use crate::core::{HasChains, MarkovChain};
use crate::distributions::{Proposal, Target};
use crate::error::{Result, SamplerError};

/// The draws of a single run, one row per iteration, and the number of accepted proposals.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace<S> {
    pub draws: Array2<S>,
    pub accepted: usize,
}

impl<S> Trace<S> {
    pub fn n_iterations(&self) -> usize {
        self.draws.nrows()
    }

    pub fn acceptance_rate(&self) -> f64 {
        self.accepted as f64 / self.n_iterations() as f64
    }
}

/// Evaluates the target at the initial state and rejects NaN or zero density.
fn initial_log_prob<S, T, D>(target: &D, state: &[S], chain: usize) -> Result<T>
where
    D: Target<S, T>,
    T: Float,
{
    if state.is_empty() {
        return Err(SamplerError::EmptyState);
    }
    let lp = target.unnorm_log_prob(state);
    if lp.is_nan() {
        return Err(SamplerError::NanLogDensity { iteration: 0 });
    }
    if lp == T::neg_infinity() {
        return Err(SamplerError::OutsideSupport { chain });
    }
    Ok(lp)
}

/// One Metropolis–Hastings transition. Updates `current` and `current_lp` in
/// place and returns whether the candidate was accepted.
fn transition<S, T, D, Q, R>(
    target: &D,
    proposal: &Q,
    current: &mut Vec<S>,
    current_lp: &mut T,
    rng: &mut R,
    iteration: usize,
) -> Result<bool>
where
    D: Target<S, T>,
    Q: Proposal<S, T>,
    T: Float,
    R: Rng,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    let candidate = proposal.sample(current, rng);
    if candidate.len() != current.len() {
        return Err(SamplerError::DimensionMismatch {
            expected: current.len(),
            found: candidate.len(),
        });
    }
    let candidate_lp = target.unnorm_log_prob(&candidate);
    if candidate_lp.is_nan() {
        return Err(SamplerError::NanLogDensity { iteration });
    }
    let u: T = rng.gen();

    let accept = if candidate_lp == T::neg_infinity() {
        false
    } else if *current_lp == T::neg_infinity() {
        true
    } else {
        let log_q_ratio = proposal.log_ratio(current, &candidate);
        if log_q_ratio.is_nan() {
            return Err(SamplerError::NanProposalRatio { iteration });
        }
        let log_accept_ratio = candidate_lp - *current_lp + log_q_ratio;
        u.ln() < log_accept_ratio
    };

    if accept {
        *current = candidate;
        *current_lp = candidate_lp;
    }
    Ok(accept)
}

/**
Runs a single Metropolis–Hastings chain for `n_iterations` iterations.

Each iteration proposes `θ'`, computes
`r = log p(θ') - log p(θ) + log q(θ | θ') - log q(θ' | θ)` and accepts if
`ln u < r` for `u ~ Uniform(0, 1)`; otherwise the previous state is repeated.
The draws therefore always have exactly `n_iterations` rows. All randomness
comes from `rng`, so a seeded generator gives bit-identical runs.

# Errors

Fails before sampling if `n_iterations` is zero, the initial state is empty, or
its log-density is NaN or `-inf`. Fails during sampling if the target or the
proposal ratio returns NaN, or the proposal changes the dimension.

# Examples

```rust
use putt_mcmc::distributions::{IntegerRandomWalk, Poisson};
use putt_mcmc::metropolis_hastings::metropolis_hastings;
use rand::SeedableRng;
use rand::rngs::SmallRng;

let target = Poisson::new(4.0).unwrap();
let proposal = IntegerRandomWalk::new(1).unwrap();
let mut rng = SmallRng::seed_from_u64(1);

let trace = metropolis_hastings::<_, f64, _, _, _>(&target, &proposal, &[0], 5_000, &mut rng).unwrap();
assert_eq!(trace.n_iterations(), 5_000);
assert!(trace.draws.iter().all(|&k| k >= 0));
```
*/
pub fn metropolis_hastings<S, T, D, Q, R>(
    target: &D,
    proposal: &Q,
    initial_state: &[S],
    n_iterations: usize,
    rng: &mut R,
) -> Result<Trace<S>>
where
    D: Target<S, T>,
    Q: Proposal<S, T>,
    S: Clone,
    T: Float,
    R: Rng,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    if n_iterations == 0 {
        return Err(SamplerError::ZeroIterations);
    }
    let mut current_lp = initial_log_prob(target, initial_state, 0)?;
    let mut current = initial_state.to_vec();
    let dim = current.len();
    let mut flat = Vec::with_capacity(n_iterations * dim);
    let mut accepted = 0;

    for iteration in 1..=n_iterations {
        if transition(target, proposal, &mut current, &mut current_lp, rng, iteration)? {
            accepted += 1;
        }
        flat.extend_from_slice(&current);
    }

    Ok(Trace {
        draws: Array2::from_shape_vec((n_iterations, dim), flat)?,
        accepted,
    })
}

/**
A collection of independent Metropolis–Hastings chains sharing one target and proposal.

# Type Parameters
- `S`: The element type for the state (e.g. `f64`, or `i64` for discrete targets).
- `T`: The floating-point type of the log-densities.
- `D`: The target distribution type. Must implement [`Target`].
- `Q`: The proposal distribution type. Must implement [`Proposal`].
*/
#[derive(Debug, Clone)]
pub struct MetropolisHastings<S, T, D, Q> {
    /// The target distribution we want to sample from.
    pub target: D,
    /// The proposal distribution used to generate candidate states.
    pub proposal: Q,
    /// The vector of independent Markov chains.
    pub chains: Vec<MHMarkovChain<S, T, D, Q>>,
    /// The global random seed.
    pub seed: u64,
}

/// A single Markov chain for the Metropolis–Hastings algorithm.
///
/// Each chain owns its target and proposal, its current state (with the cached
/// log-density), and a chain-specific random number generator.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<S, T, D, Q> {
    pub target: D,
    pub proposal: Q,
    pub current_state: Vec<S>,
    current_lp: T,
    pub seed: u64,
    pub rng: SmallRng,
    steps: usize,
    accepted: usize,
    phantom: PhantomData<T>,
}

impl<S, T, D, Q> MetropolisHastings<S, T, D, Q>
where
    D: Target<S, T> + Clone + Send,
    Q: Proposal<S, T> + Clone + Send,
    T: Float + Send,
    S: Clone + Send,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    /// Creates one chain per entry of `initial_states`.
    ///
    /// Every initial state is validated against the target before any sampling,
    /// and all of them must have the same length.
    pub fn new(target: D, proposal: Q, initial_states: Vec<Vec<S>>) -> Result<Self> {
        if initial_states.is_empty() {
            return Err(SamplerError::InvalidParameter(
                "Expected at least one chain".into(),
            ));
        }
        let dim = initial_states[0].len();
        if let Some(state) = initial_states.iter().find(|s| s.len() != dim) {
            return Err(SamplerError::DimensionMismatch {
                expected: dim,
                found: state.len(),
            });
        }
        let chains = initial_states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                MHMarkovChain::with_chain_index(target.clone(), proposal.clone(), state, i)
            })
            .collect::<Result<Vec<_>>>()?;
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            proposal,
            chains,
            seed,
        })
    }

    /// Sets a new global seed; chain `i` is reseeded with `seed + i`.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed.wrapping_add(i as u64);
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
        }
        self
    }
}

impl<S, T, D, Q> HasChains<S> for MetropolisHastings<S, T, D, Q>
where
    D: Target<S, T> + Clone + Send,
    Q: Proposal<S, T> + Clone + Send,
    T: Float + Send,
    S: Clone + Send,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    type Chain = MHMarkovChain<S, T, D, Q>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }

    fn chains(&self) -> &[Self::Chain] {
        &self.chains
    }
}

impl<S, T, D, Q> MHMarkovChain<S, T, D, Q>
where
    D: Target<S, T>,
    Q: Proposal<S, T>,
    S: Clone,
    T: Float,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    /// Creates a new Metropolis–Hastings chain seeded from the thread RNG.
    pub fn new(target: D, proposal: Q, initial_state: &[S]) -> Result<Self> {
        Self::with_chain_index(target, proposal, initial_state, 0)
    }

    fn with_chain_index(target: D, proposal: Q, initial_state: &[S], chain: usize) -> Result<Self> {
        let current_lp = initial_log_prob(&target, initial_state, chain)?;
        let seed = thread_rng().gen::<u64>();
        Ok(Self {
            target,
            proposal,
            current_state: initial_state.to_vec(),
            current_lp,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            steps: 0,
            accepted: 0,
            phantom: PhantomData,
        })
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Log-density of the current state, as cached by the last transition.
    pub fn current_log_prob(&self) -> T {
        self.current_lp
    }
}

impl<S, T, D, Q> MarkovChain<S> for MHMarkovChain<S, T, D, Q>
where
    D: Target<S, T>,
    Q: Proposal<S, T>,
    S: Clone,
    T: Float,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    /// Performs one Metropolis–Hastings update step.
    fn step(&mut self) -> Result<&[S]> {
        self.steps += 1;
        if transition(
            &self.target,
            &self.proposal,
            &mut self.current_state,
            &mut self.current_lp,
            &mut self.rng,
            self.steps,
        )? {
            self.accepted += 1;
        }
        Ok(&self.current_state)
    }

    fn current_state(&self) -> &[S] {
        &self.current_state
    }

    fn n_steps(&self) -> usize {
        self.steps
    }

    fn n_accepted(&self) -> usize {
        self.accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{run_chain, ChainRunner};
    use crate::distributions::{FnProposal, FnTarget, IsotropicGaussian};
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;

    #[test]
    fn chain_length_and_acceptance_bound() {
        let target = IsotropicGaussian::new(1.0);
        let proposal = IsotropicGaussian::new(2.0);
        let mut rng = SmallRng::seed_from_u64(5);
        let trace = metropolis_hastings(&target, &proposal, &[0.0, 0.0], 777, &mut rng).unwrap();
        assert_eq!(trace.draws.shape(), &[777, 2]);
        assert!(trace.accepted <= 777);
        assert!((0.0..=1.0).contains(&trace.acceptance_rate()));
    }

    #[test]
    fn zero_iterations_fail_fast() {
        let target = IsotropicGaussian::new(1.0);
        let mut rng = SmallRng::seed_from_u64(5);
        let err = metropolis_hastings(&target, &target, &[0.0], 0, &mut rng).unwrap_err();
        assert!(matches!(err, SamplerError::ZeroIterations));
    }

    #[test]
    fn empty_or_unsupported_initial_state_fails() {
        let half_line = FnTarget(|x: &[f64]| if x[0] > 0.0 { -x[0] } else { f64::NEG_INFINITY });
        let proposal = IsotropicGaussian::new(1.0);
        let mut rng = SmallRng::seed_from_u64(5);
        assert!(matches!(
            metropolis_hastings(&half_line, &proposal, &[-1.0], 10, &mut rng),
            Err(SamplerError::OutsideSupport { chain: 0 })
        ));
        let empty: [f64; 0] = [];
        assert!(matches!(
            metropolis_hastings(&proposal, &proposal, &empty, 10, &mut rng),
            Err(SamplerError::EmptyState)
        ));
        assert!(matches!(
            MetropolisHastings::new(half_line, proposal, vec![vec![1.0], vec![-1.0]]),
            Err(SamplerError::OutsideSupport { chain: 1 })
        ));
    }

    #[test]
    fn initial_states_must_share_a_dimension() {
        let target = IsotropicGaussian::new(1.0_f64);
        let result = MetropolisHastings::new(target, target, vec![vec![0.0], vec![0.0, 0.0]]);
        assert!(matches!(
            result,
            Err(SamplerError::DimensionMismatch {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn nan_target_fails_with_iteration() {
        let target = FnTarget(|x: &[f64]| if x[0].abs() > 0.5 { f64::NAN } else { 0.0 });
        let proposal = IsotropicGaussian::new(1.0);
        let mut rng = SmallRng::seed_from_u64(9);
        let err = metropolis_hastings(&target, &proposal, &[0.0], 10_000, &mut rng).unwrap_err();
        assert!(matches!(err, SamplerError::NanLogDensity { iteration } if iteration >= 1));

        let nan_at_start = FnTarget(|_: &[f64]| f64::NAN);
        assert!(matches!(
            metropolis_hastings(&nan_at_start, &proposal, &[0.0], 10, &mut rng),
            Err(SamplerError::NanLogDensity { iteration: 0 })
        ));
    }

    #[test]
    fn nan_proposal_ratio_fails() {
        let target = IsotropicGaussian::new(1.0);
        let proposal = FnProposal::new(|x: &[f64], _: &mut dyn RngCore| vec![x[0] + 0.1])
            .with_log_ratio(|_: &[f64], _: &[f64]| f64::NAN);
        let mut rng = SmallRng::seed_from_u64(9);
        assert!(matches!(
            metropolis_hastings(&target, &proposal, &[0.0], 10, &mut rng),
            Err(SamplerError::NanProposalRatio { iteration: 1 })
        ));
    }

    #[test]
    fn dimension_change_is_rejected() {
        let target = FnTarget(|_: &[f64]| 0.0);
        let proposal = FnProposal::new(|x: &[f64], _: &mut dyn RngCore| {
            let mut next = x.to_vec();
            next.push(0.0);
            next
        });
        let mut rng = SmallRng::seed_from_u64(9);
        assert!(matches!(
            metropolis_hastings(&target, &proposal, &[0.0], 10, &mut rng),
            Err(SamplerError::DimensionMismatch {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn unsupported_candidates_are_never_accepted() {
        // The proposal ratio would favour the move, but the target forbids it.
        let target = FnTarget(|x: &[f64]| if x[0] < 1.0 { 0.0 } else { f64::NEG_INFINITY });
        let proposal = FnProposal::new(|x: &[f64], _: &mut dyn RngCore| vec![x[0] + 1.0])
            .with_log_ratio(|_: &[f64], _: &[f64]| f64::INFINITY);
        let mut rng = SmallRng::seed_from_u64(2);
        let trace = metropolis_hastings(&target, &proposal, &[0.5], 50, &mut rng).unwrap();
        assert_eq!(trace.accepted, 0);
        assert!(trace.draws.iter().all(|&x| x == 0.5));
    }

    #[test]
    fn single_and_runner_chains_agree_for_same_seed() {
        let target = IsotropicGaussian::new(1.0);
        let proposal = IsotropicGaussian::new(0.8);
        let mut chain = MHMarkovChain::new(target, proposal, &[0.3])
            .unwrap()
            .set_seed(77);
        let via_chain = run_chain(&mut chain, 200).unwrap();

        let mut rng = SmallRng::seed_from_u64(77);
        let via_fn = metropolis_hastings(&target, &proposal, &[0.3], 200, &mut rng).unwrap();
        assert_eq!(via_chain, via_fn.draws);
        assert_eq!(chain.n_accepted(), via_fn.accepted);
    }

    #[test]
    fn gaussian_multi_chain_moments() {
        const SEED: u64 = 42;
        let target = IsotropicGaussian::new(2.0_f64);
        let proposal = IsotropicGaussian::new(2.5);
        let mut mh = MetropolisHastings::new(target, proposal, vec![vec![0.0, 0.0]; 4])
            .unwrap()
            .set_seed(SEED);
        assert_eq!(mh.chains[3].seed, SEED + 3);

        let samples = mh.run(10_000, 1_000).unwrap();
        assert_eq!(samples.shape(), &[4, 10_000, 2]);
        let pooled = samples.into_shape_with_order((40_000, 2)).unwrap();
        let mean = pooled.mean_axis(Axis(0)).unwrap();
        let var = pooled.var_axis(Axis(0), 1.0);
        assert_abs_diff_eq!(mean, ndarray::arr1(&[0.0, 0.0]), epsilon = 0.15);
        assert_abs_diff_eq!(var, ndarray::arr1(&[4.0, 4.0]), epsilon = 0.4);
        for rate in mh.acceptance_rates() {
            assert!(rate > 0.2 && rate < 0.8, "acceptance rate {rate}");
        }
    }
}
