//! Works through the putting exercises: a Poisson and a standard normal target with
//! random-walk proposals, Monte Carlo integration, the logistic model with an
//! independence proposal, and the geometry-based angle model.
//!
//! Usage: `putt-mcmc [DATA_PATH]` (space-delimited `x n y` file). Set `RUST_LOG`
//! to change the log level.

use putt_mcmc::core::ChainRunner;
use putt_mcmc::distributions::{
    GammaNormalIndependence, IntegerRandomWalk, IsotropicGaussian, Normalized, Poisson,
};
use putt_mcmc::elicit::{normal_from_interval, GammaPrior};
use putt_mcmc::golf::{AngleModelPosterior, LogisticPosterior, PuttingData};
use putt_mcmc::io::save_csv;
use putt_mcmc::metropolis_hastings::{metropolis_hastings, MetropolisHastings};
use putt_mcmc::monte_carlo::{expectation, integrate, integrate_uniform};
use putt_mcmc::stats::{ess, frequencies, pool, split_rhat, summarize};

use ndarray::Axis;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::Normal;
use std::error::Error;

const SEED: u64 = 42;
const N_CHAINS: usize = 4;
const N_COLLECT: usize = 5_000;
const N_DISCARD: usize = 500;
const DEFAULT_DATA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/golf_data.txt");

/// The independence proposal covers the point estimate ± `PROPOSAL_WIDTH` standard
/// errors with 95% of its mass, so it is wider than the posterior.
const PROPOSAL_WIDTH: f64 = 3.0;
const INTERVAL_MASS: f64 = 0.95;

fn poisson_exercise() -> Result<(), Box<dyn Error>> {
    const LAMBDA: f64 = 4.0;
    let target = Poisson::new(LAMBDA)?;
    let proposal = IntegerRandomWalk::new(1)?;
    let mut rng = SmallRng::seed_from_u64(SEED);

    let trace =
        metropolis_hastings::<_, f64, _, _, _>(&target, &proposal, &[0], 20_000, &mut rng)?;
    log::info!(
        "Poisson({LAMBDA}): {} iterations, acceptance rate {:.3}",
        trace.n_iterations(),
        trace.acceptance_rate()
    );
    let values: Vec<i64> = trace.draws.column(0).to_vec();
    for (k, freq) in frequencies(&values).into_iter().take_while(|&(k, _)| k <= 10) {
        let pmf: f64 = target.log_prob(&[k]);
        log::info!("  k = {k:2}: empirical {freq:.3}, exact {:.3}", pmf.exp());
    }
    Ok(())
}

fn normal_exercise() -> Result<(), Box<dyn Error>> {
    let target = IsotropicGaussian::new(1.0_f64);
    let proposal = IsotropicGaussian::new(2.4);
    let mut rng = SmallRng::seed_from_u64(SEED);

    let trace = metropolis_hastings(&target, &proposal, &[3.0], 20_000, &mut rng)?;
    let column = trace.draws.column(0);
    log::info!(
        "Normal(0, 1): mean {:.3}, variance {:.3}, acceptance rate {:.3}",
        column.mean().unwrap_or(f64::NAN),
        column.var(1.0),
        trace.acceptance_rate()
    );
    Ok(())
}

fn monte_carlo_exercise() -> Result<(), Box<dyn Error>> {
    let mut rng = SmallRng::seed_from_u64(SEED);
    let normal = Normal::new(0.0, 1.0)?;
    let second_moment = integrate(|x| x * x, &normal, 10_000, &mut rng)?;
    log::info!(
        "E[X^2], X ~ N(0, 1): {:.4} ± {:.4} (exact 1)",
        second_moment.estimate,
        second_moment.std_error
    );
    let area = integrate_uniform(f64::exp, 0.0, 1.0, 10_000, &mut rng)?;
    log::info!(
        "∫_0^1 e^x dx: {:.4} ± {:.4} (exact {:.4})",
        area.estimate,
        area.std_error,
        std::f64::consts::E - 1.0
    );
    Ok(())
}

fn logistic_exercise(data: &PuttingData) -> Result<(), Box<dyn Error>> {
    let posterior = LogisticPosterior::new(data.clone());
    let fit = posterior.mle()?;
    log::info!(
        "Logistic point estimate: alpha = {:.3} ({:.3}), beta = {:.4} ({:.4})",
        fit.alpha,
        fit.alpha_se,
        fit.beta,
        fit.beta_se
    );

    let alpha = GammaPrior::from_quantiles(
        fit.alpha - PROPOSAL_WIDTH * fit.alpha_se,
        fit.alpha + PROPOSAL_WIDTH * fit.alpha_se,
        INTERVAL_MASS,
    )?;
    let (beta_mean, beta_std) = normal_from_interval(
        fit.beta - PROPOSAL_WIDTH * fit.beta_se,
        fit.beta + PROPOSAL_WIDTH * fit.beta_se,
        INTERVAL_MASS,
    )?;
    let proposal = GammaNormalIndependence::new(alpha, beta_mean, beta_std)?;
    log::info!(
        "Independence proposal: alpha ~ Gamma({:.1}, {:.1}), beta ~ Normal({:.4}, {:.4})",
        alpha.shape,
        alpha.rate,
        proposal.beta_mean,
        proposal.beta_std
    );

    let initial_states = vec![vec![fit.alpha, fit.beta]; N_CHAINS];
    let mut mh = MetropolisHastings::new(posterior, proposal, initial_states)?.set_seed(SEED);
    let samples = mh.run_progress(N_COLLECT, N_DISCARD)?;

    let draws = pool(samples.view())?;
    let summary = summarize(draws.view(), &[0.05, 0.5, 0.95])?;
    let rhat = split_rhat(samples.view())?;
    let n_eff = ess(samples.view())?;
    for (i, name) in ["alpha", "beta"].iter().enumerate() {
        log::info!(
            "{name}: mean {:.4}, sd {:.4}, 90% interval [{:.4}, {:.4}], R-hat {:.3}, ESS {:.0}",
            summary[i].mean,
            summary[i].sd,
            summary[i].quantiles[0].1,
            summary[i].quantiles[2].1,
            rhat[i],
            n_eff[i]
        );
    }
    for rate in mh.acceptance_rates() {
        log::info!("  chain acceptance rate {rate:.3}");
    }

    for x in [5.0, 10.0, 15.0] {
        let p = expectation(draws.view(), |theta| {
            LogisticPosterior::success_probability(theta[0], theta[1], x)
        })?;
        log::info!("  P(success at {x} ft) ≈ {:.3}", p.estimate);
    }

    save_csv(&samples, Some(&["alpha", "beta"][..]), "logistic_draws.csv")?;
    Ok(())
}

fn angle_exercise(data: &PuttingData) -> Result<(), Box<dyn Error>> {
    let posterior = AngleModelPosterior::new(data.clone());
    let proposal = IsotropicGaussian::new(0.0005);
    let mut mh = MetropolisHastings::new(posterior, proposal, vec![vec![0.03]; N_CHAINS])?
        .set_seed(SEED);
    let samples = mh.run(N_COLLECT, N_DISCARD)?;

    let sigma = samples.index_axis(Axis(2), 0);
    let sigma_mean = sigma.mean().unwrap_or(f64::NAN);
    log::info!(
        "Angle model: sigma = {:.5} rad ({:.2} degrees), R-hat {:.3}",
        sigma_mean,
        sigma_mean.to_degrees(),
        split_rhat(samples.view())?[0]
    );
    for (x, rate) in data.distance.iter().zip(data.empirical_rates()) {
        log::info!(
            "  {x:4.1} ft: observed {rate:.3}, fitted {:.3}",
            AngleModelPosterior::success_probability(sigma_mean, *x)
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    poisson_exercise()?;
    normal_exercise()?;
    monte_carlo_exercise()?;

    let data_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_DATA.to_string());
    let data = PuttingData::from_path(&data_path, b' ')?;
    logistic_exercise(&data)?;
    angle_exercise(&data)?;

    Ok(())
}
