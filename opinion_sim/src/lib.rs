//! Session engine for the opinion dialogue simulation.
//!
//! Actors and channels live as entities in a Bevy [`App`]. The initial poll
//! runs when the app is built; every [`run_session`] call then resolves one
//! session through the chained systems configured in [`build_session_app`].

pub mod activation;
pub mod aggregation;
mod components;
pub mod config;
pub mod dialogue;
mod error;
pub mod hashing;
pub mod measures;
pub mod metrics;
pub mod network;
pub mod observation;
mod resources;
mod snapshot;
pub mod workers;

use bevy::ecs::schedule::ScheduleLabel;
use bevy::prelude::*;
use tracing::{info, info_span};

pub use activation::ActivationPolicy;
pub use components::{ActorId, ActorState, ChannelId, ChannelState, Choice};
pub use config::{CommunityConfig, ExperimentConfig, SessionConfig};
pub use dialogue::DialogueMatrix;
pub use error::SimError;
pub use metrics::SessionMetrics;
pub use network::{reference_community, Network, NetworkBuilder};
pub use opinion_schema::{ObservationSnapshot, Protocol, ProtocolHeader};
pub use resources::{NetworkIndex, SessionCounter, SessionFault};
pub use snapshot::ProtocolLog;
pub use workers::{Dispatcher, ExecutionMode};

use resources::{advance_session, record_fault, session_healthy, ObservationRng};

/// Schedule run once while building the app: precomputed activation and the
/// initial poll.
#[derive(ScheduleLabel, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prime;

/// Construct an [`App`] holding `network`, configured with the session
/// pipeline, and record the initial observation.
pub fn build_session_app(network: Network, config: SessionConfig) -> Result<App, SimError> {
    let dispatcher = Dispatcher::from_mode(config.execution)?;

    let mut app = App::new();
    let index = network::spawn_network(&mut app.world, network);
    info!(
        target: "opinion_sim::session",
        actors = index.population(),
        channels = index.channels.len(),
        variants = index.variants,
        sessions = config.sessions,
        workers = dispatcher.workers(),
        activation = config.activation.as_str(),
        "session_app.built"
    );

    app.insert_resource(index)
        .insert_resource(config)
        .insert_resource(dispatcher)
        .insert_resource(ObservationRng::from_seed(config.seed))
        .insert_resource(SessionCounter::default())
        .insert_resource(SessionFault::default())
        .insert_resource(SessionMetrics::default())
        .insert_resource(ProtocolLog::default())
        .add_plugins(MinimalPlugins)
        .add_systems(
            Prime,
            (
                activation::sample_precomputed_activation.pipe(record_fault),
                observation::observe_population.pipe(snapshot::record_snapshot),
            )
                .chain()
                .distributive_run_if(session_healthy),
        )
        .add_systems(
            Update,
            (
                advance_session,
                aggregation::clear_pending_outcomes,
                activation::sample_session_activation.pipe(record_fault),
                dialogue::simulate_dialogues.pipe(record_fault),
                aggregation::apply_session_outcomes,
                observation::observe_population.pipe(snapshot::record_snapshot),
                metrics::collect_metrics,
            )
                .chain()
                .distributive_run_if(session_healthy),
        );

    app.world.run_schedule(Prime);
    check_fault(&app)?;
    Ok(app)
}

/// Execute a single session.
///
/// Fails once the configured number of sessions has run, and keeps returning
/// the first fatal error after a session has failed.
pub fn run_session(app: &mut App) -> Result<(), SimError> {
    check_fault(app)?;
    let sessions = app.world.resource::<SessionConfig>().sessions;
    if app.world.resource::<SessionCounter>().0 >= u64::from(sessions) {
        return Err(SimError::ProtocolComplete { sessions });
    }
    app.update();
    check_fault(app)
}

/// Build the app, run every configured session, and return the protocol.
pub fn run_experiment(network: Network, config: SessionConfig) -> Result<Protocol, SimError> {
    let span = info_span!(target: "opinion_sim::session", "experiment", seed = config.seed);
    let _guard = span.enter();

    let mut app = build_session_app(network, config)?;
    for _ in 0..config.sessions {
        run_session(&mut app)?;
    }
    let protocol = protocol(&app);
    info!(
        target: "opinion_sim::session",
        snapshots = protocol.snapshots.len(),
        hash = protocol.header.hash,
        "experiment.completed"
    );
    Ok(protocol)
}

fn check_fault(app: &App) -> Result<(), SimError> {
    match app.world.resource::<SessionFault>().error() {
        Some(error) => Err(error.clone()),
        None => Ok(()),
    }
}

/// Protocol recorded so far, with its header and digest.
pub fn protocol(app: &App) -> Protocol {
    let index = app.world.resource::<NetworkIndex>();
    let config = app.world.resource::<SessionConfig>();
    let header = ProtocolHeader::new(
        index.variants,
        index.population(),
        index.channels.len(),
        config.sessions,
        config.seed,
        config.activation,
    );
    Protocol {
        header,
        snapshots: app.world.resource::<ProtocolLog>().snapshots().to_vec(),
    }
    .finalize()
}

/// Current actor states in id order.
pub fn actor_states(app: &App) -> Vec<ActorState> {
    let index = app.world.resource::<NetworkIndex>();
    index
        .actors
        .iter()
        .filter_map(|entity| app.world.get::<ActorState>(*entity).cloned())
        .collect()
}

/// Current channel states in id order.
pub fn channel_states(app: &App) -> Vec<ChannelState> {
    let index = app.world.resource::<NetworkIndex>();
    index
        .channels
        .iter()
        .filter_map(|entity| app.world.get::<ChannelState>(*entity).cloned())
        .collect()
}

pub fn session_metrics(app: &App) -> &SessionMetrics {
    app.world.resource::<SessionMetrics>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_network(probability: f64) -> Network {
        let mut builder = NetworkBuilder::new(2);
        let a = builder.add_actor(vec![1.0, 0.0], 5.0).expect("actor");
        let b = builder.add_actor(vec![0.0, 1.0], 5.0).expect("actor");
        let matrix = DialogueMatrix::from_self_weights(0.5, 0.5).expect("matrix");
        builder.connect(a, b, probability, matrix).expect("channel");
        builder.build().expect("network")
    }

    fn config(sessions: u32) -> SessionConfig {
        SessionConfig {
            sessions,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn build_records_initial_observation() {
        let app = build_session_app(pair_network(1.0), config(3)).expect("app");
        let log = app.world.resource::<ProtocolLog>();
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshots()[0].session, 0);
        assert_eq!(app.world.resource::<SessionCounter>().0, 0);
    }

    #[test]
    fn active_pair_meets_in_the_middle() {
        let mut app = build_session_app(pair_network(1.0), config(1)).expect("app");
        run_session(&mut app).expect("session");

        let actors = actor_states(&app);
        assert_eq!(actors[0].preference_density, vec![0.5, 0.5]);
        assert_eq!(actors[1].preference_density, vec![0.5, 0.5]);
        assert_eq!(actors[0].pending_outcomes.len(), 1);

        let metrics = session_metrics(&app);
        assert_eq!(metrics.session, 1);
        assert_eq!(metrics.active_channels, 1);
        assert_eq!(metrics.engaged_actors, 2);
        assert_eq!(metrics.idle_actors, 0);
    }

    #[test]
    fn scheduler_stops_after_configured_sessions() {
        let mut app = build_session_app(pair_network(1.0), config(2)).expect("app");
        run_session(&mut app).expect("first");
        run_session(&mut app).expect("second");
        assert_eq!(
            run_session(&mut app),
            Err(SimError::ProtocolComplete { sessions: 2 })
        );
        let protocol = protocol(&app);
        assert_eq!(protocol.snapshots.len(), 3);
        let sessions: Vec<u64> = protocol.snapshots.iter().map(|s| s.session).collect();
        assert_eq!(sessions, vec![0, 1, 2]);
    }

    #[test]
    fn fault_is_sticky() {
        let mut app = build_session_app(pair_network(1.0), config(5)).expect("app");
        app.world
            .resource_mut::<SessionFault>()
            .record(SimError::InvalidProbability(2.0));
        assert_eq!(
            run_session(&mut app),
            Err(SimError::InvalidProbability(2.0))
        );
        assert_eq!(
            run_session(&mut app),
            Err(SimError::InvalidProbability(2.0))
        );
        assert_eq!(app.world.resource::<ProtocolLog>().len(), 1);
    }

    #[test]
    fn invalid_density_aborts_observation() {
        let mut app = build_session_app(pair_network(1.0), config(2)).expect("app");
        let index = app.world.resource::<NetworkIndex>().clone();
        app.world
            .get_mut::<ActorState>(index.actors[1])
            .expect("actor")
            .preference_density = vec![f64::NAN, f64::NAN];

        // the dialogue spreads the NaN to both actors; actor 0 is polled first
        let result = run_session(&mut app);
        assert!(matches!(
            result,
            Err(SimError::InvalidCategorical {
                actor: ActorId(0) | ActorId(1),
                ..
            })
        ));
        let log = app.world.resource::<ProtocolLog>();
        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
        assert_eq!(app.world.resource::<SessionMetrics>().session, 0);
    }

    #[test]
    fn parallel_dispatch_runs_sessions() {
        let session = SessionConfig {
            sessions: 2,
            execution: ExecutionMode::Parallel { workers: 2 },
            ..SessionConfig::default()
        };
        let protocol = run_experiment(pair_network(1.0), session).expect("experiment");
        assert_eq!(protocol.snapshots.len(), 3);
        assert!(!protocol.header.approximate_activation);
    }
}
