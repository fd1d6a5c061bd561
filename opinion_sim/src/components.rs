use std::fmt;

use bevy::prelude::*;

use crate::dialogue::DialogueMatrix;

/// Identifier of an actor; actors are numbered densely from zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

impl ActorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a channel, assigned in insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl ChannelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Choice declared by an actor at the latest poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Choice {
    Variant(usize),
    Disclaim,
}

impl Choice {
    pub fn is_disclaim(self) -> bool {
        matches!(self, Choice::Disclaim)
    }
}

/// Per-actor state: a probability distribution over the choice variants plus
/// the outcomes collected during the running session.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct ActorState {
    pub id: ActorId,
    pub preference_density: Vec<f64>,
    pub choice: Choice,
    pub rho: f64,
    pub pending_outcomes: Vec<Vec<f64>>,
}

impl ActorState {
    pub fn new(id: ActorId, preference_density: Vec<f64>, rho: f64, choice: Choice) -> Self {
        Self {
            id,
            preference_density,
            choice,
            rho,
            pending_outcomes: Vec::new(),
        }
    }
}

/// Per-channel state. `alice` is always the lower actor id.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub id: ChannelId,
    pub alice: ActorId,
    pub bob: ActorId,
    pub activation_probability: f64,
    pub dialogue_matrix: DialogueMatrix,
    pub is_active: bool,
}

impl ChannelState {
    pub fn endpoints(&self) -> (ActorId, ActorId) {
        (self.alice, self.bob)
    }
}
