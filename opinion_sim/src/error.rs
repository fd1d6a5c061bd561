use thiserror::Error;

use crate::components::{ActorId, ChannelId};

/// Failures raised while building a network or running sessions.
///
/// Construction errors are reported before the first session. Everything
/// raised during a session is fatal for the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("network has no actors")]
    EmptyNetwork,
    #[error("network needs at least one choice variant")]
    NoVariants,
    #[error("preference density of actor {actor} is not a distribution: {reason}")]
    InvalidDensity { actor: ActorId, reason: String },
    #[error("sensitivity exponent of actor {actor} must be positive, got {rho}")]
    InvalidSensitivity { actor: ActorId, rho: f64 },
    #[error("activation probability {probability} of channel {alice}-{bob} outside [0, 1]")]
    InvalidActivationProbability {
        alice: ActorId,
        bob: ActorId,
        probability: f64,
    },
    #[error("dialogue matrix is not row-stochastic: {reason}")]
    MalformedDialogueMatrix { reason: String },
    #[error("channel endpoints must differ, got a loop on actor {0}")]
    SelfLoop(ActorId),
    #[error("channel between {0} and {1} already exists")]
    DuplicateChannel(ActorId, ActorId),
    #[error("actor {0} is not part of the network")]
    UnknownActor(ActorId),
    #[error("channel {0} is not part of the network")]
    UnknownChannel(ChannelId),
    #[error("invalid community configuration: {0}")]
    InvalidCommunity(String),
    #[error("Bernoulli probability {0} outside [0, 1]")]
    InvalidProbability(f64),
    #[error("categorical draw for actor {actor} failed: {reason}")]
    InvalidCategorical { actor: ActorId, reason: String },
    #[error("worker partition {partition} failed: {reason}")]
    WorkerFailed { partition: usize, reason: String },
    #[error("worker pool returned {received} of {expected} partitions")]
    MissingResults { expected: usize, received: usize },
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
    #[error("protocol already holds all {sessions} sessions")]
    ProtocolComplete { sessions: u32 },
}
