// Node-level configuration for the consensus core, merged from a TOML file
// and environment overrides the way `fendermint_app_settings` merges node
// configuration: a `config::Config` builder stacking a file source under an
// environment source, deserialized into a typed tree.

use std::time::Duration;

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};

/// Which network this node is running against. Only affects the timing
/// constants derived from `base_latency` (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnv {
    Development,
    Beta,
    Live,
}

impl Default for NetworkEnv {
    fn default() -> Self {
        Self::Live
    }
}

impl NetworkEnv {
    /// `base_latency` per spec.md §4.1: 25ms in development, 1s otherwise.
    pub fn base_latency(&self) -> Duration {
        match self {
            NetworkEnv::Development => Duration::from_millis(25),
            NetworkEnv::Beta | NetworkEnv::Live => Duration::from_secs(1),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActiveElectionsSettings {
    /// `N_active`.
    pub size: usize,
    pub hinted_limit_percentage: u8,
    pub optimistic_limit_percentage: u8,
    pub confirmation_history_size: usize,
    pub confirmation_cache: usize,
}

impl Default for ActiveElectionsSettings {
    fn default() -> Self {
        Self {
            size: 5_000,
            hinted_limit_percentage: 20,
            optimistic_limit_percentage: 10,
            confirmation_history_size: 2_048,
            confirmation_cache: 65_536,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacklogSettings {
    pub max_backlog: usize,
    pub bucket_threshold: usize,
    pub batch_size: usize,
}

impl Default for BacklogSettings {
    fn default() -> Self {
        Self {
            max_backlog: 100_000,
            bucket_threshold: 1_000,
            batch_size: 128,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VotingSettings {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub vote_generator_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub vote_spacing_delay: Duration,
    pub max_cache: usize,
    pub confirm_ack_hashes_max: usize,
    pub confirm_req_hashes_max: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub block_broadcast_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub vote_broadcast_interval: Duration,
}

impl Default for VotingSettings {
    fn default() -> Self {
        Self {
            vote_generator_delay: Duration::from_millis(100),
            vote_spacing_delay: Duration::from_secs(30),
            max_cache: 2 * 1024,
            confirm_ack_hashes_max: 16,
            confirm_req_hashes_max: 7,
            block_broadcast_interval: Duration::from_secs(15),
            vote_broadcast_interval: Duration::from_secs(15),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElectionBehaviorSettings {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub priority_ttl: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub manual_ttl: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub hinted_ttl: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub optimistic_ttl: Duration,
}

impl Default for ElectionBehaviorSettings {
    fn default() -> Self {
        Self {
            priority_ttl: Duration::from_secs(5 * 60),
            manual_ttl: Duration::from_secs(5 * 60),
            hinted_ttl: Duration::from_secs(30),
            optimistic_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoteProcessorSettings {
    pub io_threads: usize,
    /// Minimum representative weight, as a percentage of online stake,
    /// required to be admitted into each of the three priority tiers.
    pub tier_1_percent: f64,
    pub tier_2_percent: f64,
    pub tier_3_percent: f64,
}

impl Default for VoteProcessorSettings {
    fn default() -> Self {
        Self {
            io_threads: 4,
            tier_1_percent: 0.1,
            tier_2_percent: 1.0,
            tier_3_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network: NetworkEnv,
    pub active_elections: ActiveElectionsSettings,
    pub bounded_backlog: BacklogSettings,
    pub voting: VotingSettings,
    pub election_behavior: ElectionBehaviorSettings,
    pub vote_processor: VoteProcessorSettings,
}

impl Settings {
    /// Load settings from an optional TOML file, then overlay any
    /// `LATTICE__SECTION__KEY`-style environment variables on top, the way
    /// `fendermint_app_settings` layers `File` under `Environment`.
    pub fn from_file_and_env(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("LATTICE")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert_eq!(settings.active_elections.size, 5_000);
        assert_eq!(settings.bounded_backlog.max_backlog, 100_000);
        assert_eq!(settings.voting.confirm_ack_hashes_max, 16);
        assert_eq!(
            settings.election_behavior.hinted_ttl,
            Duration::from_secs(30)
        );
        assert_eq!(settings.network.base_latency(), Duration::from_secs(1));
    }

    #[test]
    fn env_override_takes_effect() {
        std::env::set_var("LATTICE__ACTIVE_ELECTIONS__SIZE", "42");
        let settings = Settings::from_file_and_env(None).unwrap();
        assert_eq!(settings.active_elections.size, 42);
        std::env::remove_var("LATTICE__ACTIVE_ELECTIONS__SIZE");
    }
}
