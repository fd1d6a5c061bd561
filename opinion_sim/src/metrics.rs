use bevy::prelude::*;
use tracing::debug;

use crate::{
    components::{ActorState, ChannelState},
    resources::SessionCounter,
};

/// Activity counters of the latest session plus running totals.
#[derive(Resource, Default, Debug, Clone, PartialEq)]
pub struct SessionMetrics {
    pub session: u64,
    pub active_channels: u32,
    pub engaged_actors: u32,
    pub idle_actors: u32,
    pub total_dialogues: u64,
}

pub fn collect_metrics(
    counter: Res<SessionCounter>,
    mut metrics: ResMut<SessionMetrics>,
    channels: Query<&ChannelState>,
    actors: Query<&ActorState>,
) {
    let active_channels = channels.iter().filter(|channel| channel.is_active).count() as u32;
    let mut engaged_actors = 0u32;
    let mut idle_actors = 0u32;
    for actor in actors.iter() {
        if actor.pending_outcomes.is_empty() {
            idle_actors += 1;
        } else {
            engaged_actors += 1;
        }
    }

    metrics.session = counter.0;
    metrics.active_channels = active_channels;
    metrics.engaged_actors = engaged_actors;
    metrics.idle_actors = idle_actors;
    metrics.total_dialogues += active_channels as u64;

    debug!(
        target: "opinion_sim::session",
        session = counter.0,
        active_channels,
        engaged_actors,
        idle_actors,
        "session.metrics"
    );
}
