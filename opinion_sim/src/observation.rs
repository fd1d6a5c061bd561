//! Polling of every actor's declared choice and the population statistics
//! derived from it.

use bevy::prelude::*;
use opinion_schema::ObservationSnapshot;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::{
    components::{ActorId, ActorState, Choice},
    error::SimError,
    measures::{bernoulli_trial, normalized_entropy, uncertainty},
    resources::{NetworkIndex, ObservationRng, SessionCounter},
};

/// Probability that an actor with `density` declines to choose.
pub fn disclaim_probability(density: &[f64], rho: f64) -> f64 {
    normalized_entropy(density).powf(rho)
}

/// Poll one actor: disclaim with probability `h(w)^rho`, otherwise draw a
/// variant from the density itself.
pub fn poll_actor<R: Rng + ?Sized>(
    rng: &mut R,
    actor: ActorId,
    density: &[f64],
    rho: f64,
) -> Result<Choice, SimError> {
    if bernoulli_trial(rng, disclaim_probability(density, rho))? {
        return Ok(Choice::Disclaim);
    }
    let categorical = WeightedIndex::new(density).map_err(|err| SimError::InvalidCategorical {
        actor,
        reason: err.to_string(),
    })?;
    Ok(Choice::Variant(categorical.sample(rng)))
}

/// Population statistics over `(density, choice)` pairs.
pub fn summarize_poll<'a, I>(session: u64, variants: usize, actors: I) -> ObservationSnapshot
where
    I: IntoIterator<Item = (&'a [f64], Choice)>,
{
    let mut mean_density = vec![0.0; variants];
    let mut votes = vec![0u32; variants];
    let mut population = 0u32;
    let mut disclaimers = 0u32;

    for (density, choice) in actors {
        population += 1;
        for (slot, value) in mean_density.iter_mut().zip(density) {
            *slot += value;
        }
        match choice {
            Choice::Disclaim => disclaimers += 1,
            Choice::Variant(variant) => {
                if let Some(count) = votes.get_mut(variant) {
                    *count += 1;
                }
            }
        }
    }

    if population > 0 {
        let scale = 1.0 / population as f64;
        for slot in mean_density.iter_mut() {
            *slot *= scale;
        }
    }

    let claimants = population - disclaimers;
    if claimants == 0 {
        return ObservationSnapshot {
            session,
            mean_density,
            disclaim_fraction: 1.0,
            poll_shares: uncertainty(variants),
            population,
            claimants,
        };
    }

    let poll_shares = votes
        .iter()
        .map(|count| *count as f64 / claimants as f64)
        .collect();
    ObservationSnapshot {
        session,
        mean_density,
        disclaim_fraction: disclaimers as f64 / population as f64,
        poll_shares,
        population,
        claimants,
    }
}

/// Poll every actor in id order, then summarise the population.
pub fn observe_population(
    index: Res<NetworkIndex>,
    counter: Res<SessionCounter>,
    mut rng: ResMut<ObservationRng>,
    mut actors: Query<&mut ActorState>,
) -> Result<ObservationSnapshot, SimError> {
    for (position, &entity) in index.actors.iter().enumerate() {
        let id = ActorId(position as u32);
        let mut actor = actors.get_mut(entity).map_err(|_| SimError::UnknownActor(id))?;
        let choice = poll_actor(&mut rng.0, id, &actor.preference_density, actor.rho)?;
        actor.choice = choice;
    }

    let mut polled = Vec::with_capacity(index.population());
    for (position, &entity) in index.actors.iter().enumerate() {
        let actor = actors
            .get(entity)
            .map_err(|_| SimError::UnknownActor(ActorId(position as u32)))?;
        polled.push((actor.preference_density.as_slice(), actor.choice));
    }
    Ok(summarize_poll(counter.0, index.variants, polled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn certain_actor_never_disclaims() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            let choice = poll_actor(&mut rng, ActorId(0), &[1.0, 0.0], 20.0).expect("poll");
            assert_eq!(choice, Choice::Variant(0));
        }
    }

    #[test]
    fn undecided_actor_always_disclaims() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..200 {
            let choice = poll_actor(&mut rng, ActorId(0), &[0.5, 0.5], 20.0).expect("poll");
            assert_eq!(choice, Choice::Disclaim);
        }
    }

    #[test]
    fn invalid_density_is_fatal() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let result = poll_actor(&mut rng, ActorId(4), &[0.0, 0.0], 1.0);
        assert!(matches!(
            result,
            Err(SimError::InvalidCategorical { actor: ActorId(4), .. })
        ));
    }

    #[test]
    fn claims_and_disclaims_partition_population() {
        let densities = [vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5], vec![0.9, 0.1]];
        let choices = [
            Choice::Variant(0),
            Choice::Variant(1),
            Choice::Disclaim,
            Choice::Variant(0),
        ];
        let snapshot = summarize_poll(
            3,
            2,
            densities
                .iter()
                .map(Vec::as_slice)
                .zip(choices.iter().copied()),
        );

        assert_eq!(snapshot.session, 3);
        assert_eq!(snapshot.population, 4);
        assert_eq!(snapshot.claimants, 3);
        let disclaimers = snapshot.disclaim_fraction * snapshot.population as f64;
        assert!((disclaimers + snapshot.claimants as f64 - 4.0).abs() < 1e-12);
        let share_sum: f64 = snapshot.poll_shares.iter().sum();
        assert!((share_sum - 1.0).abs() < 1e-12);
        assert!((snapshot.poll_shares[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((snapshot.mean_density[0] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn unanimous_disclaim_reports_uncertainty() {
        let densities = [vec![0.5, 0.5], vec![0.4, 0.6]];
        let snapshot = summarize_poll(
            0,
            2,
            densities
                .iter()
                .map(|density| (density.as_slice(), Choice::Disclaim)),
        );
        assert_eq!(snapshot.disclaim_fraction, 1.0);
        assert_eq!(snapshot.poll_shares, uncertainty(2));
        assert!(snapshot.unanimous_disclaim());
    }
}
