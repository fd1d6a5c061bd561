#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use opinion_sim::config::{load_experiment_config, ExperimentConfig};
use opinion_sim::{DialogueMatrix, Network, NetworkBuilder};

static INIT: Once = Once::new();

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_experiment_config.json")
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path();
        debug_assert!(
            config_path.exists(),
            "missing test experiment config at {}",
            config_path.display()
        );
        std::env::set_var("EXPERIMENT_CONFIG_PATH", &config_path);
    });
}

pub fn test_config() -> Arc<ExperimentConfig> {
    let (config, metadata) = load_experiment_config(&fixture_path());
    assert_eq!(metadata.path(), Some(&fixture_path()));
    config
}

/// Three actors on a triangle whose channels never mix densities.
pub fn identity_triangle(probability: f64) -> anyhow::Result<Network> {
    let mut builder = NetworkBuilder::new(3);
    let a = builder.add_actor(vec![1.0, 0.0, 0.0], 3.0)?;
    let b = builder.add_actor(vec![0.2, 0.5, 0.3], 3.0)?;
    let c = builder.add_actor(vec![0.1, 0.1, 0.8], 3.0)?;
    builder.connect(a, b, probability, DialogueMatrix::identity())?;
    builder.connect(b, c, probability, DialogueMatrix::identity())?;
    builder.connect(a, c, probability, DialogueMatrix::identity())?;
    Ok(builder.build()?)
}
