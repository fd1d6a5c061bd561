use std::time::Instant;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use opinion_schema::Protocol;
use opinion_sim::{
    reference_community, run_experiment, ActivationPolicy, CommunityConfig, ExecutionMode,
    SessionConfig,
};
use tracing::info;

use crate::ExperimentArgs;

struct Timed {
    protocol: Protocol,
    seconds: f64,
}

fn run_config(
    args: &ExperimentArgs,
    execution: ExecutionMode,
    activation: Option<ActivationPolicy>,
) -> (SessionConfig, CommunityConfig) {
    let (session, community) = args.resolve();
    let session = SessionConfig {
        execution,
        activation: activation.unwrap_or(session.activation),
        ..session
    };
    (session, community)
}

fn timed_run(
    args: &ExperimentArgs,
    execution: ExecutionMode,
    activation: Option<ActivationPolicy>,
) -> Result<Timed> {
    let (session, community) = run_config(args, execution, activation);
    let network = reference_community(&community, session.seed)
        .wrap_err("failed to build reference community")?;
    let started = Instant::now();
    let protocol = run_experiment(network, session)
        .wrap_err_with(|| format!("{execution:?} run failed"))?;
    Ok(Timed {
        protocol,
        seconds: started.elapsed().as_secs_f64(),
    })
}

/// Parallel run first, then the sequential one, on the same community and
/// seed. `parallel_activation` overrides the policy of the parallel run.
pub fn run(
    args: &ExperimentArgs,
    workers: usize,
    parallel_activation: Option<ActivationPolicy>,
) -> Result<()> {
    let parallel = timed_run(args, ExecutionMode::Parallel { workers }, parallel_activation)?;
    info!(
        seconds = parallel.seconds,
        activation = parallel.protocol.header.activation.as_str(),
        "parallel run finished"
    );
    let sequential = timed_run(args, ExecutionMode::Sequential, None)?;
    info!(seconds = sequential.seconds, "sequential run finished");

    println!("parallel:   {:.3}s", parallel.seconds);
    println!("sequential: {:.3}s", sequential.seconds);
    if parallel.seconds > 0.0 {
        println!("speed-up:   {:.2}x", sequential.seconds / parallel.seconds);
    }

    let identical = parallel.protocol == sequential.protocol;
    println!("identical protocols: {identical}");
    if parallel.protocol.header.approximate_activation {
        println!("activation: precomputed once (approximation, protocols may differ)");
    }

    if let (Some(par), Some(seq)) = (parallel.protocol.last(), sequential.protocol.last()) {
        let w_delta = par
            .mean_density
            .iter()
            .zip(&seq.mean_density)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        println!("max |dW| at final snapshot: {w_delta:.6}");
        println!(
            "|dDP| at final snapshot: {:.6}",
            (par.disclaim_fraction - seq.disclaim_fraction).abs()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::{Cli, Command};

    fn compare_args(argv: &[&str]) -> crate::CompareArgs {
        match Cli::try_parse_from(argv).expect("arguments parse").command {
            Command::Compare(args) => args,
            other => panic!("expected compare, got {other:?}"),
        }
    }

    #[test]
    fn parallel_activation_overrides_only_the_parallel_run() {
        let args = compare_args(&[
            "opinion_cli",
            "compare",
            "--activation",
            "per-session",
            "--parallel-activation",
            "precomputed-once",
            "--workers",
            "2",
        ]);
        let parallel_activation = args.parallel_activation.map(ActivationPolicy::from);
        let (parallel, _) = run_config(
            &args.experiment,
            ExecutionMode::Parallel { workers: 2 },
            parallel_activation,
        );
        let (sequential, _) = run_config(&args.experiment, ExecutionMode::Sequential, None);

        assert_eq!(parallel.activation, ActivationPolicy::PrecomputedOnce);
        assert_eq!(parallel.execution, ExecutionMode::Parallel { workers: 2 });
        assert_eq!(sequential.activation, ActivationPolicy::PerSession);
        assert_eq!(sequential.seed, parallel.seed);
    }

    #[test]
    fn shared_activation_applies_without_override() {
        let args = compare_args(&["opinion_cli", "compare", "--activation", "precomputed-once"]);
        assert!(args.parallel_activation.is_none());
        let (parallel, _) = run_config(
            &args.experiment,
            ExecutionMode::Parallel { workers: 0 },
            None,
        );
        assert_eq!(parallel.activation, ActivationPolicy::PrecomputedOnce);
    }
}
