use bevy::prelude::*;

use crate::components::ActorState;

/// Element-wise mean of a session's dialogue outcomes, or `None` when the
/// actor took part in no dialogue.
pub fn aggregate_outcomes(outcomes: &[Vec<f64>]) -> Option<Vec<f64>> {
    let first = outcomes.first()?;
    let mut sum = vec![0.0; first.len()];
    for outcome in outcomes {
        for (slot, value) in sum.iter_mut().zip(outcome) {
            *slot += value;
        }
    }
    let scale = 1.0 / outcomes.len() as f64;
    for slot in sum.iter_mut() {
        *slot *= scale;
    }
    Some(sum)
}

pub fn clear_pending_outcomes(mut actors: Query<&mut ActorState>) {
    for mut actor in actors.iter_mut() {
        actor.pending_outcomes.clear();
    }
}

/// Session barrier: replace each engaged actor's density with the mean of its
/// outcomes. Runs only once every dialogue of the session has been routed.
pub fn apply_session_outcomes(mut actors: Query<&mut ActorState>) {
    for mut actor in actors.iter_mut() {
        if let Some(density) = aggregate_outcomes(&actor.pending_outcomes) {
            actor.preference_density = density;
        }
    }
}
