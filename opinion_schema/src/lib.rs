//! Data contracts for the opinion dialogue simulation.
//!
//! The engine in `opinion_sim` produces a [`Protocol`]: one
//! [`ObservationSnapshot`] for the initial poll plus one per simulated
//! session. This crate owns those types and their encodings so that writers
//! and analysis tools do not need the ECS runtime.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::hash::{BuildHasher, Hasher};
use std::io;

/// How channel activity is sampled across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Every channel is resampled at the start of every session.
    #[default]
    PerSession,
    /// Every channel is sampled once before the first session and the result
    /// is reused for the whole run.
    ///
    /// Only valid while activation probabilities stay fixed, and even then a
    /// channel that happened to be active stays active forever. Long-run
    /// statistics drift from [`ActivationPolicy::PerSession`] when channels
    /// carry dissimilar probabilities.
    PrecomputedOnce,
}

impl ActivationPolicy {
    /// Whether this policy departs from per-session resampling semantics.
    pub fn is_approximation(self) -> bool {
        matches!(self, ActivationPolicy::PrecomputedOnce)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivationPolicy::PerSession => "per_session",
            ActivationPolicy::PrecomputedOnce => "precomputed_once",
        }
    }
}

/// Population statistics captured by one poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationSnapshot {
    /// Session index; 0 is the poll taken before the first session.
    pub session: u64,
    /// Mean preference density over all actors (`W`).
    pub mean_density: Vec<f64>,
    /// Share of actors that declined to state a choice.
    pub disclaim_fraction: f64,
    /// Share of each variant among actors that did choose (`WP`). Falls back
    /// to the maximal-uncertainty distribution when nobody chose.
    pub poll_shares: Vec<f64>,
    pub population: u32,
    pub claimants: u32,
}

impl ObservationSnapshot {
    pub fn unanimous_disclaim(&self) -> bool {
        self.claimants == 0
    }

    pub fn disclaimers(&self) -> u32 {
        self.population - self.claimants
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolHeader {
    pub variants: u32,
    pub population: u32,
    pub channels: u32,
    pub sessions: u32,
    pub seed: u64,
    pub activation: ActivationPolicy,
    pub approximate_activation: bool,
    pub hash: u64,
}

impl ProtocolHeader {
    pub fn new(
        variants: usize,
        population: usize,
        channels: usize,
        sessions: u32,
        seed: u64,
        activation: ActivationPolicy,
    ) -> Self {
        Self {
            variants: variants as u32,
            population: population as u32,
            channels: channels as u32,
            sessions,
            seed,
            activation,
            approximate_activation: activation.is_approximation(),
            hash: 0,
        }
    }
}

/// Ordered observation log of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Protocol {
    pub header: ProtocolHeader,
    pub snapshots: Vec<ObservationSnapshot>,
}

impl Protocol {
    pub fn finalize(mut self) -> Self {
        self.header.hash = hash_protocol(&self);
        self
    }

    pub fn last(&self) -> Option<&ObservationSnapshot> {
        self.snapshots.last()
    }

    /// Mean disclaim fraction over the trailing `window` snapshots.
    pub fn trailing_disclaim_fraction(&self, window: usize) -> Option<f64> {
        let window = window.min(self.snapshots.len());
        if window == 0 {
            return None;
        }
        let tail = &self.snapshots[self.snapshots.len() - window..];
        let total: f64 = tail.iter().map(|snapshot| snapshot.disclaim_fraction).sum();
        Some(total / window as f64)
    }
}

pub fn hash_protocol(protocol: &Protocol) -> u64 {
    let mut clone = protocol.clone();
    clone.header.hash = 0;
    let encoded = bincode::serialize(&clone).expect("protocol serialization for hashing");
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

/// One line per snapshot: the mean density, the disclaim fraction and the
/// poll shares, separated by single spaces.
pub fn encode_snapshot_line(snapshot: &ObservationSnapshot) -> String {
    let mut line = String::new();
    for value in &snapshot.mean_density {
        let _ = write!(line, "{:?} ", value);
    }
    let _ = write!(line, "{:?}", snapshot.disclaim_fraction);
    for value in &snapshot.poll_shares {
        let _ = write!(line, " {:?}", value);
    }
    line
}

pub fn encode_protocol_text(protocol: &Protocol) -> String {
    let mut text = String::new();
    for snapshot in &protocol.snapshots {
        text.push_str(&encode_snapshot_line(snapshot));
        text.push('\n');
    }
    text
}

pub fn encode_protocol_json(protocol: &Protocol) -> serde_json::Result<String> {
    serde_json::to_string_pretty(protocol)
}

pub fn decode_protocol_json(data: &str) -> serde_json::Result<Protocol> {
    serde_json::from_str(data)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolFormat {
    #[default]
    Text,
    Json,
}

pub fn write_protocol<W: io::Write>(
    writer: &mut W,
    protocol: &Protocol,
    format: ProtocolFormat,
) -> io::Result<()> {
    match format {
        ProtocolFormat::Text => writer.write_all(encode_protocol_text(protocol).as_bytes()),
        ProtocolFormat::Json => {
            let json = encode_protocol_json(protocol).map_err(io::Error::from)?;
            writer.write_all(json.as_bytes())?;
            writer.write_all(b"\n")
        }
    }
}
