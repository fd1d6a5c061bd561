//! Bilateral dialogue over an active channel.

use bevy::prelude::*;
use tracing::trace;

use crate::{
    components::{ActorId, ActorState, ChannelId, ChannelState},
    error::SimError,
    resources::NetworkIndex,
    workers::Dispatcher,
};

const ROW_TOLERANCE: f64 = 1e-9;

/// 2×2 row-stochastic mixing matrix of a channel.
///
/// Row 0 mixes alice's result, row 1 mixes bob's; column 0 weighs alice's
/// prior density and column 1 bob's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DialogueMatrix([[f64; 2]; 2]);

impl DialogueMatrix {
    pub fn new(rows: [[f64; 2]; 2]) -> Result<Self, SimError> {
        for (index, row) in rows.iter().enumerate() {
            if row.iter().any(|value| !value.is_finite() || *value < 0.0) {
                return Err(SimError::MalformedDialogueMatrix {
                    reason: format!("row {index} has a negative or non-finite entry {row:?}"),
                });
            }
            let sum = row[0] + row[1];
            if (sum - 1.0).abs() > ROW_TOLERANCE {
                return Err(SimError::MalformedDialogueMatrix {
                    reason: format!("row {index} sums to {sum}"),
                });
            }
        }
        Ok(Self(rows))
    }

    /// Matrix where each side keeps `alice_self` / `bob_self` of its own
    /// density and takes the remainder from the other side.
    pub fn from_self_weights(alice_self: f64, bob_self: f64) -> Result<Self, SimError> {
        Self::new([[alice_self, 1.0 - alice_self], [1.0 - bob_self, bob_self]])
    }

    pub fn identity() -> Self {
        Self([[1.0, 0.0], [0.0, 1.0]])
    }

    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.0[row][column]
    }

    pub fn rows(&self) -> [[f64; 2]; 2] {
        self.0
    }
}

/// Not-yet-aggregated densities produced by one dialogue.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueOutcome {
    pub channel: ChannelId,
    pub alice: ActorId,
    pub bob: ActorId,
    pub alice_density: Vec<f64>,
    pub bob_density: Vec<f64>,
}

/// Self-contained dialogue work item. Carries copies of both densities so it
/// can run on any worker without touching the network.
#[derive(Debug, Clone)]
pub struct DialogueTask {
    pub channel: ChannelId,
    pub alice: ActorId,
    pub bob: ActorId,
    pub matrix: DialogueMatrix,
    pub alice_density: Vec<f64>,
    pub bob_density: Vec<f64>,
}

impl DialogueTask {
    pub fn run(self) -> DialogueOutcome {
        let (alice_density, bob_density) =
            simulate_dialogue(&self.matrix, &self.alice_density, &self.bob_density);
        DialogueOutcome {
            channel: self.channel,
            alice: self.alice,
            bob: self.bob,
            alice_density,
            bob_density,
        }
    }
}

/// Mix two densities through `matrix`, returning alice's and bob's results.
pub fn simulate_dialogue(
    matrix: &DialogueMatrix,
    alice: &[f64],
    bob: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let alice_result = alice
        .iter()
        .zip(bob)
        .map(|(a, b)| matrix.get(0, 0) * a + matrix.get(0, 1) * b)
        .collect();
    let bob_result = alice
        .iter()
        .zip(bob)
        .map(|(a, b)| matrix.get(1, 0) * a + matrix.get(1, 1) * b)
        .collect();
    (alice_result, bob_result)
}

/// Run every active channel's dialogue and route both results into the
/// endpoints' pending outcomes in channel order.
pub fn simulate_dialogues(
    index: Res<NetworkIndex>,
    dispatcher: Res<Dispatcher>,
    channels: Query<&ChannelState>,
    mut actors: Query<&mut ActorState>,
) -> Result<(), SimError> {
    let mut tasks = Vec::new();
    for (position, &entity) in index.channels.iter().enumerate() {
        let channel = channels
            .get(entity)
            .map_err(|_| SimError::UnknownChannel(ChannelId(position as u32)))?;
        if !channel.is_active {
            continue;
        }
        let alice = actors
            .get(index.actor_entity(channel.alice)?)
            .map_err(|_| SimError::UnknownActor(channel.alice))?;
        let bob = actors
            .get(index.actor_entity(channel.bob)?)
            .map_err(|_| SimError::UnknownActor(channel.bob))?;
        tasks.push(DialogueTask {
            channel: channel.id,
            alice: channel.alice,
            bob: channel.bob,
            matrix: channel.dialogue_matrix,
            alice_density: alice.preference_density.clone(),
            bob_density: bob.preference_density.clone(),
        });
    }

    let outcomes = dispatcher.dispatch(tasks, |task| Ok(task.run()))?;
    trace!(
        target: "opinion_sim::session",
        dialogues = outcomes.len(),
        "dialogues.completed"
    );

    for outcome in outcomes {
        let mut alice = actors
            .get_mut(index.actor_entity(outcome.alice)?)
            .map_err(|_| SimError::UnknownActor(outcome.alice))?;
        alice.pending_outcomes.push(outcome.alice_density);
        let mut bob = actors
            .get_mut(index.actor_entity(outcome.bob)?)
            .map_err(|_| SimError::UnknownActor(outcome.bob))?;
        bob.pending_outcomes.push(outcome.bob_density);
    }
    Ok(())
}
