//! Network construction and validation.
//!
//! A [`Network`] is assembled once, validated as it is built, and then handed
//! to [`crate::build_session_app`]. Its topology never changes afterwards.

use std::collections::HashSet;

use bevy::prelude::*;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    components::{ActorId, ActorState, ChannelId, ChannelState, Choice},
    config::CommunityConfig,
    dialogue::DialogueMatrix,
    error::SimError,
    measures::{define_dialogue_matrix, uncertainty},
    resources::NetworkIndex,
};

const DENSITY_TOLERANCE: f64 = 1e-9;

/// Validated undirected simple graph of actors and channels.
#[derive(Debug, Clone)]
pub struct Network {
    variants: usize,
    actors: Vec<ActorState>,
    channels: Vec<ChannelState>,
}

impl Network {
    pub fn variants(&self) -> usize {
        self.variants
    }

    pub fn actors(&self) -> &[ActorState] {
        &self.actors
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }
}

#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    variants: usize,
    actors: Vec<ActorState>,
    channels: Vec<ChannelState>,
    edges: HashSet<(ActorId, ActorId)>,
}

impl NetworkBuilder {
    pub fn new(variants: usize) -> Self {
        Self {
            variants,
            actors: Vec::new(),
            channels: Vec::new(),
            edges: HashSet::new(),
        }
    }

    /// Add an actor whose initial choice is [`Choice::Disclaim`].
    pub fn add_actor(&mut self, density: Vec<f64>, rho: f64) -> Result<ActorId, SimError> {
        self.add_actor_with_choice(density, rho, Choice::Disclaim)
    }

    pub fn add_actor_with_choice(
        &mut self,
        density: Vec<f64>,
        rho: f64,
        choice: Choice,
    ) -> Result<ActorId, SimError> {
        let id = ActorId(self.actors.len() as u32);
        validate_density(id, &density, self.variants)?;
        if !(rho.is_finite() && rho > 0.0) {
            return Err(SimError::InvalidSensitivity { actor: id, rho });
        }
        if let Choice::Variant(variant) = choice {
            if variant >= self.variants {
                return Err(SimError::InvalidDensity {
                    actor: id,
                    reason: format!("initial choice {variant} exceeds {} variants", self.variants),
                });
            }
        }
        self.actors.push(ActorState::new(id, density, rho, choice));
        Ok(id)
    }

    /// Link two distinct actors. The endpoints are stored lower id first; the
    /// matrix rows follow that order.
    pub fn connect(
        &mut self,
        first: ActorId,
        second: ActorId,
        activation_probability: f64,
        dialogue_matrix: DialogueMatrix,
    ) -> Result<ChannelId, SimError> {
        for actor in [first, second] {
            if actor.index() >= self.actors.len() {
                return Err(SimError::UnknownActor(actor));
            }
        }
        if first == second {
            return Err(SimError::SelfLoop(first));
        }
        let (alice, bob) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        if !(0.0..=1.0).contains(&activation_probability) {
            return Err(SimError::InvalidActivationProbability {
                alice,
                bob,
                probability: activation_probability,
            });
        }
        if !self.edges.insert((alice, bob)) {
            return Err(SimError::DuplicateChannel(alice, bob));
        }

        let id = ChannelId(self.channels.len() as u32);
        self.channels.push(ChannelState {
            id,
            alice,
            bob,
            activation_probability,
            dialogue_matrix,
            is_active: false,
        });
        Ok(id)
    }

    /// Connect every pair of actors added so far, asking `channel` for the
    /// activation probability and matrix of each `(alice, bob)` pair.
    pub fn connect_complete<F>(&mut self, mut channel: F) -> Result<(), SimError>
    where
        F: FnMut(ActorId, ActorId) -> Result<(f64, DialogueMatrix), SimError>,
    {
        let count = self.actors.len() as u32;
        for alice in 0..count {
            for bob in (alice + 1)..count {
                let (probability, matrix) = channel(ActorId(alice), ActorId(bob))?;
                self.connect(ActorId(alice), ActorId(bob), probability, matrix)?;
            }
        }
        Ok(())
    }

    pub fn build(self) -> Result<Network, SimError> {
        if self.variants == 0 {
            return Err(SimError::NoVariants);
        }
        if self.actors.is_empty() {
            return Err(SimError::EmptyNetwork);
        }
        Ok(Network {
            variants: self.variants,
            actors: self.actors,
            channels: self.channels,
        })
    }
}

fn validate_density(actor: ActorId, density: &[f64], variants: usize) -> Result<(), SimError> {
    if density.len() != variants {
        return Err(SimError::InvalidDensity {
            actor,
            reason: format!("expected {variants} entries, got {}", density.len()),
        });
    }
    if let Some(value) = density.iter().find(|value| !value.is_finite() || **value < 0.0) {
        return Err(SimError::InvalidDensity {
            actor,
            reason: format!("entry {value} is negative or not finite"),
        });
    }
    let sum: f64 = density.iter().sum();
    if (sum - 1.0).abs() > DENSITY_TOLERANCE {
        return Err(SimError::InvalidDensity {
            actor,
            reason: format!("entries sum to {sum}"),
        });
    }
    Ok(())
}

/// Community of the reference experiment: a complete graph where actor 0 is
/// certain of the first variant and never moves, actor 1 is certain of the
/// last variant, and everybody else starts maximally uncertain.
pub fn reference_community(config: &CommunityConfig, seed: u64) -> Result<Network, SimError> {
    if config.actors < 2 {
        return Err(SimError::InvalidCommunity(format!(
            "needs at least 2 actors, got {}",
            config.actors
        )));
    }
    if config.variants < 2 {
        return Err(SimError::InvalidCommunity(format!(
            "needs at least 2 variants, got {}",
            config.variants
        )));
    }
    let (low, high) = (config.self_weight_min, config.self_weight_max);
    if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
        return Err(SimError::InvalidCommunity(format!(
            "self-weight range [{low}, {high}] must lie within [0, 1]"
        )));
    }

    let variants = config.variants;
    let mut builder = NetworkBuilder::new(variants);
    for actor in 0..config.actors {
        match actor {
            0 => {
                builder.add_actor_with_choice(one_hot(variants, 0), config.rho, Choice::Variant(0))?
            }
            1 => builder.add_actor(one_hot(variants, variants - 1), config.rho)?,
            _ => builder.add_actor(uncertainty(variants), config.rho)?,
        };
    }

    let mut rng = SmallRng::seed_from_u64(seed ^ 0xC0FF_EE00_D1A1_0600);
    let self_weight = |rng: &mut SmallRng| {
        if low < high {
            rng.gen_range(low..high)
        } else {
            low
        }
    };
    builder.connect_complete(|alice, _bob| {
        let matrix = if alice == ActorId(0) {
            define_dialogue_matrix(1.0, self_weight(&mut rng))?
        } else {
            let alice_self = self_weight(&mut rng);
            define_dialogue_matrix(alice_self, self_weight(&mut rng))?
        };
        Ok((config.activation_probability, matrix))
    })?;
    builder.build()
}

fn one_hot(variants: usize, variant: usize) -> Vec<f64> {
    let mut density = vec![0.0; variants];
    density[variant] = 1.0;
    density
}

/// Spawn every actor and channel as an entity and index them by id.
pub fn spawn_network(world: &mut World, network: Network) -> NetworkIndex {
    let actors = network
        .actors
        .into_iter()
        .map(|actor| world.spawn(actor).id())
        .collect();
    let channels = network
        .channels
        .into_iter()
        .map(|channel| world.spawn(channel).id())
        .collect();
    NetworkIndex {
        variants: network.variants,
        actors,
        channels,
    }
}
