//! Channel activation sampling.
//!
//! Each channel's draw in a sampling round comes from its own ChaCha stream
//! keyed by the run seed, the round and the channel id, so a round produces
//! the same activations whether it runs on one thread or many.

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

pub use opinion_schema::ActivationPolicy;

use crate::{
    components::{ChannelId, ChannelState},
    config::SessionConfig,
    error::SimError,
    hashing::stream_seed,
    measures::bernoulli_trial,
    resources::{NetworkIndex, SessionCounter},
    workers::Dispatcher,
};

const ACTIVATION_DOMAIN: &str = "activation";
const STATIC_ROUND: u64 = u64::MAX;

/// Identifies which sampling round a draw belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationRound {
    Session(u64),
    /// The single round drawn before the session loop under
    /// [`ActivationPolicy::PrecomputedOnce`].
    Static,
}

impl ActivationRound {
    fn key(self) -> u64 {
        match self {
            ActivationRound::Session(session) => session,
            ActivationRound::Static => STATIC_ROUND,
        }
    }
}

pub fn activation_rng(seed: u64, round: ActivationRound, channel: ChannelId) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(stream_seed(
        seed,
        ACTIVATION_DOMAIN,
        &[round.key(), channel.0 as u64],
    ))
}

/// Draw one activation per `(channel, probability)` pair.
pub fn sample_activations(
    dispatcher: &Dispatcher,
    seed: u64,
    round: ActivationRound,
    draws: Vec<(ChannelId, f64)>,
) -> Result<Vec<(ChannelId, bool)>, SimError> {
    dispatcher.dispatch(draws, |(channel, probability)| {
        let mut rng = activation_rng(seed, round, channel);
        Ok((channel, bernoulli_trial(&mut rng, probability)?))
    })
}

fn resample_channels(
    dispatcher: &Dispatcher,
    seed: u64,
    round: ActivationRound,
    index: &NetworkIndex,
    channels: &mut Query<&mut ChannelState>,
) -> Result<usize, SimError> {
    let mut draws = Vec::with_capacity(index.channels.len());
    for (position, &entity) in index.channels.iter().enumerate() {
        let channel = channels
            .get(entity)
            .map_err(|_| SimError::UnknownChannel(ChannelId(position as u32)))?;
        draws.push((channel.id, channel.activation_probability));
    }

    let mut active = 0;
    for (id, is_active) in sample_activations(dispatcher, seed, round, draws)? {
        let mut channel = channels
            .get_mut(index.channel_entity(id)?)
            .map_err(|_| SimError::UnknownChannel(id))?;
        channel.is_active = is_active;
        if is_active {
            active += 1;
        }
    }
    Ok(active)
}

/// Session-start sampling under [`ActivationPolicy::PerSession`].
pub fn sample_session_activation(
    config: Res<SessionConfig>,
    counter: Res<SessionCounter>,
    index: Res<NetworkIndex>,
    dispatcher: Res<Dispatcher>,
    mut channels: Query<&mut ChannelState>,
) -> Result<(), SimError> {
    if config.activation != ActivationPolicy::PerSession {
        return Ok(());
    }
    let round = ActivationRound::Session(counter.0);
    let active = resample_channels(&dispatcher, config.seed, round, &index, &mut channels)?;
    debug!(
        target: "opinion_sim::activation",
        session = counter.0,
        active,
        channels = index.channels.len(),
        "activation.sampled"
    );
    Ok(())
}

/// One-off sampling before the first session under
/// [`ActivationPolicy::PrecomputedOnce`].
pub fn sample_precomputed_activation(
    config: Res<SessionConfig>,
    index: Res<NetworkIndex>,
    dispatcher: Res<Dispatcher>,
    mut channels: Query<&mut ChannelState>,
) -> Result<(), SimError> {
    if config.activation != ActivationPolicy::PrecomputedOnce {
        return Ok(());
    }
    let active = resample_channels(
        &dispatcher,
        config.seed,
        ActivationRound::Static,
        &index,
        &mut channels,
    )?;
    warn!(
        target: "opinion_sim::activation",
        active,
        channels = index.channels.len(),
        "activation.precomputed: channel activity is sampled once and reused for every session"
    );
    Ok(())
}
