use std::hash::Hasher;

/// A deterministic FNV-1a 64-bit hasher.
///
/// `DefaultHasher` is randomized per process; random streams derived from
/// run seeds must be stable across runs and platforms.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// Seed for the random stream identified by `domain` and `keys` under the
/// run seed `seed`.
pub fn stream_seed(seed: u64, domain: &str, keys: &[u64]) -> u64 {
    let mut hasher = FnvHasher::new();
    hasher.write(&seed.to_le_bytes());
    hasher.write(domain.as_bytes());
    for key in keys {
        hasher.write(&key.to_le_bytes());
    }
    hasher.finish()
}
