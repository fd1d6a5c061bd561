use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    components::{ActorId, ChannelId},
    error::SimError,
};

/// Number of sessions completed so far. Zero until the first session runs.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounter(pub u64);

/// Maps actor and channel ids onto their entities, in id order.
///
/// Every system that needs a stable order walks these vectors rather than the
/// query iteration order.
#[derive(Resource, Debug, Clone, Default)]
pub struct NetworkIndex {
    pub variants: usize,
    pub actors: Vec<Entity>,
    pub channels: Vec<Entity>,
}

impl NetworkIndex {
    pub fn actor_entity(&self, id: ActorId) -> Result<Entity, SimError> {
        self.actors
            .get(id.index())
            .copied()
            .ok_or(SimError::UnknownActor(id))
    }

    pub fn channel_entity(&self, id: ChannelId) -> Result<Entity, SimError> {
        self.channels
            .get(id.index())
            .copied()
            .ok_or(SimError::UnknownChannel(id))
    }

    pub fn population(&self) -> usize {
        self.actors.len()
    }
}

/// Random stream consumed by the polls, in actor order.
#[derive(Resource, Debug, Clone)]
pub struct ObservationRng(pub ChaCha8Rng);

impl ObservationRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed ^ 0x0B5E_7A71_0000_0000))
    }
}

/// First fatal error raised by a session system. Once set, no session system
/// runs again.
#[derive(Resource, Default, Debug, Clone)]
pub struct SessionFault(pub Option<SimError>);

impl SessionFault {
    pub fn record(&mut self, error: SimError) {
        if self.0.is_none() {
            self.0 = Some(error);
        }
    }

    pub fn error(&self) -> Option<&SimError> {
        self.0.as_ref()
    }
}

pub fn session_healthy(fault: Res<SessionFault>) -> bool {
    fault.0.is_none()
}

pub fn record_fault(In(result): In<Result<(), SimError>>, mut fault: ResMut<SessionFault>) {
    if let Err(error) = result {
        tracing::error!(
            target: "opinion_sim::session",
            error = %error,
            "session.fault"
        );
        fault.record(error);
    }
}

pub fn advance_session(mut counter: ResMut<SessionCounter>) {
    counter.0 += 1;
}
