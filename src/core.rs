//! Chain abstractions and the (parallel) runners shared by all samplers.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{s, stack, Array2, Array3, Axis};
use num_traits::ToPrimitive;
use rayon::prelude::*;

use crate::error::{Result, SamplerError};
use crate::stats::ChainTracker;

const ACCEPTANCE_LOW: f64 = 0.05;
const ACCEPTANCE_HIGH: f64 = 0.95;

pub trait MarkovChain<S> {
    /// Does one iteration of the chain, returning the new current state.
    /// A rejected proposal leaves the state unchanged but still counts as a step.
    fn step(&mut self) -> Result<&[S]>;

    /// Get the current state without stepping.
    fn current_state(&self) -> &[S];

    /// Number of iterations performed so far.
    fn n_steps(&self) -> usize;

    /// Number of accepted proposals so far.
    fn n_accepted(&self) -> usize;

    /// Fraction of accepted proposals, in `[0, 1]`. Zero before the first step.
    fn acceptance_rate(&self) -> f64 {
        match self.n_steps() {
            0 => 0.0,
            n => self.n_accepted() as f64 / n as f64,
        }
    }
}

/// Runs `chain` for `n_steps` iterations, returning one row per iteration.
pub fn run_chain<S, M>(chain: &mut M, n_steps: usize) -> Result<Array2<S>>
where
    M: MarkovChain<S>,
    S: Clone,
{
    if n_steps == 0 {
        return Err(SamplerError::ZeroIterations);
    }
    let dim = chain.current_state().len();
    let mut flat = Vec::with_capacity(n_steps * dim);
    for _ in 0..n_steps {
        flat.extend_from_slice(chain.step()?);
    }
    Ok(Array2::from_shape_vec((n_steps, dim), flat)?)
}

pub fn run_chain_with_progress<S, M>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Result<Array2<S>>
where
    M: MarkovChain<S>,
    S: Clone + ToPrimitive,
{
    if n_steps == 0 {
        return Err(SamplerError::ZeroIterations);
    }
    let dim = chain.current_state().len();
    let mut flat = Vec::with_capacity(n_steps * dim);
    let mut tracker = ChainTracker::new(dim);

    pb.set_length(n_steps as u64);

    for i in 0..n_steps {
        let accepted_before = chain.n_accepted();
        let start = flat.len();
        flat.extend_from_slice(chain.step()?);
        tracker.step(&flat[start..], chain.n_accepted() > accepted_before)?;

        pb.inc(1);
        if i % 100 == 0 {
            pb.set_message(format!("p(accept)≈{:.2}", tracker.p_accept()));
        }
    }

    let stats = tracker.stats();
    log::debug!(
        "Chain ran {} steps: running mean {}, variance {}, recent p(accept) {:.2}",
        stats.n,
        stats.mean,
        stats.sm2,
        stats.p_accept
    );

    Ok(Array2::from_shape_vec((n_steps, dim), flat)?)
}

/// A trait for "anything that owns multiple MarkovChains".
/// - `S` is the state element type (e.g. f64).
/// - `Chain` is the MarkovChain type stored by this struct.
pub trait HasChains<S> {
    type Chain: MarkovChain<S> + Send;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;

    fn chains(&self) -> &[Self::Chain];
}

pub trait ChainRunner<S>: HasChains<S>
where
    S: Clone + Send + Sync + ToPrimitive + 'static,
{
    /// Runs the chains in parallel for `n_discard + n_collect` steps each and
    /// returns the last `n_collect` draws as an array of shape
    /// `(n_chains, n_collect, dim)`.
    fn run(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<S>> {
        if n_collect == 0 {
            return Err(SamplerError::ZeroIterations);
        }
        log::debug!(
            "Running {} chains for {} steps ({} discarded)",
            self.chains().len(),
            n_collect + n_discard,
            n_discard
        );
        let results: Vec<Array2<S>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| -> Result<Array2<S>> {
                let samples = run_chain(chain, n_collect + n_discard)?;
                Ok(samples.slice(s![n_discard.., ..]).to_owned())
            })
            .collect::<Result<_>>()?;

        log_acceptance(&self.acceptance_rates());
        stack_chains(&results)
    }

    /// Same as [`ChainRunner::run`], with one progress bar per chain.
    fn run_progress(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<S>> {
        if n_collect == 0 {
            return Err(SamplerError::ZeroIterations);
        }
        let n_steps = n_collect + n_discard;
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-");

        let results: Vec<Array2<S>> = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| -> Result<Array2<S>> {
                let pb = multi.add(ProgressBar::new(n_steps as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let samples = run_chain_with_progress(chain, n_steps, &pb)?;

                pb.finish_with_message(format!("Done! p(accept)={:.2}", chain.acceptance_rate()));
                Ok(samples.slice(s![n_discard.., ..]).to_owned())
            })
            .collect::<Result<_>>()?;

        log_acceptance(&self.acceptance_rates());
        stack_chains(&results)
    }

    /// Acceptance rate of each chain over all steps run so far.
    fn acceptance_rates(&self) -> Vec<f64> {
        self.chains().iter().map(|c| c.acceptance_rate()).collect()
    }
}

impl<S, T> ChainRunner<S> for T
where
    S: Clone + Send + Sync + ToPrimitive + 'static,
    T: HasChains<S>,
{
}

fn stack_chains<S: Clone>(results: &[Array2<S>]) -> Result<Array3<S>> {
    let views: Vec<_> = results.iter().map(|a| a.view()).collect();
    Ok(stack(Axis(0), &views)?)
}

fn log_acceptance(rates: &[f64]) {
    for (i, &rate) in rates.iter().enumerate() {
        if rate < ACCEPTANCE_LOW || rate > ACCEPTANCE_HIGH {
            log::warn!("Chain {i} has an unusual acceptance rate of {rate:.3}");
        } else {
            log::debug!("Chain {i} finished with acceptance rate {rate:.3}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic counter chain: accepts every other step.
    struct Counter {
        state: Vec<u32>,
        steps: usize,
        accepted: usize,
    }

    impl MarkovChain<u32> for Counter {
        fn step(&mut self) -> Result<&[u32]> {
            self.steps += 1;
            if self.steps % 2 == 0 {
                self.state[0] += 1;
                self.accepted += 1;
            }
            Ok(&self.state)
        }
        fn current_state(&self) -> &[u32] {
            &self.state
        }
        fn n_steps(&self) -> usize {
            self.steps
        }
        fn n_accepted(&self) -> usize {
            self.accepted
        }
    }

    struct Counters(Vec<Counter>);

    impl HasChains<u32> for Counters {
        type Chain = Counter;
        fn chains_mut(&mut self) -> &mut Vec<Counter> {
            &mut self.0
        }
        fn chains(&self) -> &[Counter] {
            &self.0
        }
    }

    fn counter() -> Counter {
        Counter {
            state: vec![0],
            steps: 0,
            accepted: 0,
        }
    }

    #[test]
    fn run_chain_one_row_per_step() {
        let mut chain = counter();
        let out = run_chain(&mut chain, 5).unwrap();
        assert_eq!(out.shape(), &[5, 1]);
        assert_eq!(out.column(0).to_vec(), vec![0, 1, 1, 2, 2]);
        assert_eq!(chain.acceptance_rate(), 0.4);
        assert!(matches!(
            run_chain(&mut chain, 0),
            Err(SamplerError::ZeroIterations)
        ));
    }

    #[test]
    fn runner_discards_burn_in() {
        let mut chains = Counters(vec![counter(), counter(), counter()]);
        let out = chains.run(4, 2).unwrap();
        assert_eq!(out.shape(), &[3, 4, 1]);
        // Steps 3..=6 of each chain.
        assert_eq!(out.slice(s![0, .., 0]).to_vec(), vec![1, 2, 2, 3]);
        assert_eq!(chains.acceptance_rates(), vec![0.5; 3]);
    }

    #[test]
    fn progress_runner_matches_plain_runner() {
        let mut plain = Counters(vec![counter(), counter()]);
        let mut progress = Counters(vec![counter(), counter()]);
        assert_eq!(plain.run(10, 3).unwrap(), progress.run_progress(10, 3).unwrap());
    }
}
