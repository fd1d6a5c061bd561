use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::{activation::ActivationPolicy, workers::ExecutionMode};

pub const BUILTIN_EXPERIMENT_CONFIG: &str = include_str!("data/experiment_config.json");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    session: SessionConfig,
    community: CommunityConfig,
}

impl ExperimentConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_EXPERIMENT_CONFIG)
                .expect("builtin experiment config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ExperimentConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ExperimentConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = ExperimentConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn community(&self) -> &CommunityConfig {
        &self.community
    }
}

#[derive(Debug, Error)]
pub enum ExperimentConfigError {
    #[error("failed to parse experiment config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read experiment config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Scheduler settings for one run.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of sessions (`niter`); the protocol ends up with one more
    /// snapshot than this.
    pub sessions: u32,
    pub seed: u64,
    pub activation: ActivationPolicy,
    pub execution: ExecutionMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sessions: 50,
            seed: 0x5EED,
            activation: ActivationPolicy::PerSession,
            execution: ExecutionMode::Sequential,
        }
    }
}

/// Parameters of the reference community built by
/// [`crate::network::reference_community`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    pub actors: u32,
    pub variants: usize,
    pub rho: f64,
    pub activation_probability: f64,
    pub self_weight_min: f64,
    pub self_weight_max: f64,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            actors: 200,
            variants: 2,
            rho: 20.0,
            activation_probability: 1.0,
            self_weight_min: 0.2,
            self_weight_max: 0.6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExperimentConfigMetadata {
    path: Option<PathBuf>,
}

impl ExperimentConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_experiment_config_from_env() -> (Arc<ExperimentConfig>, ExperimentConfigMetadata) {
    let Some(path) = env::var("EXPERIMENT_CONFIG_PATH").ok().map(PathBuf::from) else {
        tracing::info!(
            target: "opinion_sim::config",
            "experiment_config.loaded=builtin"
        );
        return (
            ExperimentConfig::builtin(),
            ExperimentConfigMetadata::new(None),
        );
    };
    load_experiment_config(&path)
}

/// Load `path`, falling back to the builtin config when it cannot be read or
/// parsed.
pub fn load_experiment_config(path: &Path) -> (Arc<ExperimentConfig>, ExperimentConfigMetadata) {
    match ExperimentConfig::from_file(path) {
        Ok(config) => {
            tracing::info!(
                target: "opinion_sim::config",
                path = %path.display(),
                "experiment_config.loaded=file"
            );
            (
                Arc::new(config),
                ExperimentConfigMetadata::new(Some(path.to_path_buf())),
            )
        }
        Err(err) => {
            tracing::warn!(
                target: "opinion_sim::config",
                path = %path.display(),
                error = %err,
                "experiment_config.load_failed"
            );
            tracing::info!(
                target: "opinion_sim::config",
                "experiment_config.loaded=builtin"
            );
            (
                ExperimentConfig::builtin(),
                ExperimentConfigMetadata::new(None),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_reference_experiment() {
        let config = ExperimentConfig::builtin();
        assert_eq!(config.session().sessions, 50);
        assert_eq!(config.session().activation, ActivationPolicy::PerSession);
        assert_eq!(config.community(), &CommunityConfig::default());
    }

    #[test]
    fn parses_parallel_precomputed_run() {
        let config = ExperimentConfig::from_json_str(
            r#"{
                "session": {
                    "sessions": 12,
                    "activation": "precomputed_once",
                    "execution": { "mode": "parallel", "workers": 4 }
                },
                "community": { "actors": 30, "activation_probability": 0.5 }
            }"#,
        )
        .expect("config parses");
        let session = config.session();
        assert_eq!(session.sessions, 12);
        assert_eq!(session.seed, SessionConfig::default().seed);
        assert_eq!(session.activation, ActivationPolicy::PrecomputedOnce);
        assert_eq!(session.execution, ExecutionMode::Parallel { workers: 4 });
        assert_eq!(config.community().actors, 30);
        assert_eq!(config.community().rho, 20.0);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = ExperimentConfig::from_json_str(r#"{"session": {"activation": "sometimes"}}"#)
            .expect_err("unknown policy");
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = Path::new("/definitely/not/here.json");
        match ExperimentConfig::from_file(path) {
            Err(ExperimentConfigError::ReadFailed { path: failed, .. }) => {
                assert_eq!(failed, path);
            }
            other => panic!("expected read failure, got {other:?}"),
        }
        let (config, metadata) = load_experiment_config(path);
        assert!(metadata.path().is_none());
        assert_eq!(config.session().sessions, 50);
    }
}
