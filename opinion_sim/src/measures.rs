//! Scalar measures and small constructors shared by the pipeline stages.

use rand::distributions::{Bernoulli, Distribution};
use rand::Rng;

use crate::{dialogue::DialogueMatrix, error::SimError};

/// Single Bernoulli draw. Probabilities outside `[0, 1]` (or NaN) are errors.
pub fn bernoulli_trial<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> Result<bool, SimError> {
    let distribution =
        Bernoulli::new(probability).map_err(|_| SimError::InvalidProbability(probability))?;
    Ok(distribution.sample(rng))
}

/// Shannon entropy of `density` normalised by `ln n`: 0 for a certain
/// preference, 1 for the uniform one.
pub fn normalized_entropy(density: &[f64]) -> f64 {
    if density.len() < 2 {
        return 0.0;
    }
    let entropy: f64 = density
        .iter()
        .filter(|weight| **weight > 0.0)
        .map(|weight| -weight * weight.ln())
        .sum();
    (entropy / (density.len() as f64).ln()).clamp(0.0, 1.0)
}

/// Maximal-uncertainty distribution over `variants` choices.
pub fn uncertainty(variants: usize) -> Vec<f64> {
    if variants == 0 {
        return Vec::new();
    }
    vec![1.0 / variants as f64; variants]
}

/// Channel mixing matrix from the self-weights of both participants: alice
/// keeps `alice_self` of her own density, bob keeps `bob_self` of his.
pub fn define_dialogue_matrix(alice_self: f64, bob_self: f64) -> Result<DialogueMatrix, SimError> {
    DialogueMatrix::from_self_weights(alice_self, bob_self)
}
