use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use opinion_schema::{write_protocol, ProtocolFormat};
use opinion_sim::config::{load_experiment_config, load_experiment_config_from_env};
use opinion_sim::{
    reference_community, run_experiment, ActivationPolicy, CommunityConfig, ExecutionMode,
    SessionConfig,
};
use tracing::info;

mod compare;

#[derive(Parser, Debug)]
#[command(author, version, about = "Opinion dialogue session runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reference community and write its protocol.
    Run(RunArgs),
    /// Time the parallel and sequential runners on the same community.
    Compare(CompareArgs),
}

#[derive(Args, Debug, Clone)]
struct ExperimentArgs {
    /// Experiment config file; defaults to $EXPERIMENT_CONFIG_PATH or the builtin config.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    actors: Option<u32>,
    #[arg(long)]
    variants: Option<usize>,
    #[arg(long)]
    sessions: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    rho: Option<f64>,
    /// Probability that a channel is active in a session.
    #[arg(long)]
    probability: Option<f64>,
    #[arg(long, value_enum)]
    activation: Option<ActivationArg>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    experiment: ExperimentArgs,
    /// Worker threads; 0 uses every core. Runs sequentially when omitted.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,
    /// Protocol destination; stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[command(flatten)]
    experiment: ExperimentArgs,
    #[arg(long, default_value_t = 0)]
    workers: usize,
    /// Activation policy of the parallel run only; defaults to the shared one.
    #[arg(long, value_enum)]
    parallel_activation: Option<ActivationArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ActivationArg {
    PerSession,
    PrecomputedOnce,
}

impl From<ActivationArg> for ActivationPolicy {
    fn from(value: ActivationArg) -> Self {
        match value {
            ActivationArg::PerSession => ActivationPolicy::PerSession,
            ActivationArg::PrecomputedOnce => ActivationPolicy::PrecomputedOnce,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ProtocolFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => ProtocolFormat::Text,
            FormatArg::Json => ProtocolFormat::Json,
        }
    }
}

impl ExperimentArgs {
    /// Loaded config with command-line overrides applied.
    fn resolve(&self) -> (SessionConfig, CommunityConfig) {
        let (config, metadata) = match &self.config {
            Some(path) => load_experiment_config(path),
            None => load_experiment_config_from_env(),
        };
        if let Some(path) = metadata.path() {
            info!(path = %path.display(), "using experiment config file");
        }

        let mut session = *config.session();
        let mut community = config.community().clone();
        if let Some(actors) = self.actors {
            community.actors = actors;
        }
        if let Some(variants) = self.variants {
            community.variants = variants;
        }
        if let Some(rho) = self.rho {
            community.rho = rho;
        }
        if let Some(probability) = self.probability {
            community.activation_probability = probability;
        }
        if let Some(sessions) = self.sessions {
            session.sessions = sessions;
        }
        if let Some(seed) = self.seed {
            session.seed = seed;
        }
        if let Some(activation) = self.activation {
            session.activation = activation.into();
        }
        (session, community)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Compare(args) => compare::run(
            &args.experiment,
            args.workers,
            args.parallel_activation.map(ActivationPolicy::from),
        ),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let (mut session, community) = args.experiment.resolve();
    if let Some(workers) = args.workers {
        session.execution = ExecutionMode::Parallel { workers };
    }

    let network = reference_community(&community, session.seed)
        .wrap_err("failed to build reference community")?;
    let protocol = run_experiment(network, session).wrap_err("experiment failed")?;

    let format = args.format.into();
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_protocol(&mut writer, &protocol, format)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write_protocol(&mut writer, &protocol, format)?;
            writer.flush()?;
        }
    }

    if protocol.header.approximate_activation {
        eprintln!("note: precomputed-once activation is an approximation of per-session sampling");
    }
    eprintln!(
        "{} snapshots, digest {:016x}",
        protocol.snapshots.len(),
        protocol.header.hash
    );
    Ok(())
}
