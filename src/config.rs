//! Command-line configuration, validated once at startup.

use clap::Parser;

use crate::error::ConfigError;

#[derive(Debug, Parser)]
#[command(name = "selfish-mining-sim", about = "Discrete-event simulator of selfish mining over a delayed P2P network")]
pub struct Cli {
    /// Number of peers in the network (minimum 6, so the connected
    /// neighbor-graph sampler always has room to work with).
    #[arg(long, default_value_t = 50)]
    pub peers: usize,

    /// Hashing power of the first adversary, as a percentage of the network total.
    #[arg(long, default_value_t = 0)]
    pub zeta1: u32,

    /// Hashing power of the second adversary, as a percentage of the network total.
    #[arg(long, default_value_t = 0)]
    pub zeta2: u32,

    /// Mean time between a peer's own transactions, in milliseconds.
    #[arg(long, default_value_t = 2000.0)]
    pub t_mean_ms: f64,

    /// Mean time to mine a block at hashing power 1.0, in milliseconds.
    #[arg(long, default_value_t = 600_000.0)]
    pub mean_block_time_ms: f64,

    /// Hard cap on the number of events processed before the run is aborted.
    #[arg(long, default_value_t = 2_000_000)]
    pub max_iterations: u64,

    /// Seed for the deterministic RNG; omit for a time-derived seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory under which `output_<params>/` is created.
    #[arg(long, default_value = ".")]
    pub output_root: String,
}

/// Validated, ready-to-run configuration derived from [`Cli`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub num_peers: usize,
    pub zeta1_pct: u32,
    pub zeta2_pct: u32,
    pub t_mean_seconds: f64,
    pub mean_block_time_seconds: f64,
    pub max_iterations: u64,
    pub seed: u64,
    pub output_root: String,
}

impl SimConfig {
    pub fn from_cli(cli: Cli, fallback_seed: u64) -> Result<Self, ConfigError> {
        if cli.peers < 6 {
            return Err(ConfigError::TooFewPeers(cli.peers));
        }
        if cli.zeta1 + cli.zeta2 > 100 {
            return Err(ConfigError::AdversaryShareTooLarge { zeta1: cli.zeta1, zeta2: cli.zeta2 });
        }
        if cli.t_mean_ms <= 0.0 {
            return Err(ConfigError::NonPositiveTxnInterval(cli.t_mean_ms));
        }
        if cli.mean_block_time_ms <= 0.0 {
            return Err(ConfigError::NonPositiveBlockTime(cli.mean_block_time_ms));
        }

        Ok(SimConfig {
            num_peers: cli.peers,
            zeta1_pct: cli.zeta1,
            zeta2_pct: cli.zeta2,
            t_mean_seconds: cli.t_mean_ms / 1000.0,
            mean_block_time_seconds: cli.mean_block_time_ms / 1000.0,
            max_iterations: cli.max_iterations,
            seed: cli.seed.unwrap_or(fallback_seed),
            output_root: cli.output_root,
        })
    }

    /// Directory name for this run's analysis output, e.g.
    /// `output_50_10_0_2000_600000_2000000`.
    pub fn output_dir_name(&self) -> String {
        format!(
            "output_{}_{}_{}_{}_{}_{}",
            self.num_peers,
            self.zeta1_pct,
            self.zeta2_pct,
            self.t_mean_seconds * 1000.0,
            self.mean_block_time_seconds * 1000.0,
            self.max_iterations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            peers: 50,
            zeta1: 10,
            zeta2: 20,
            t_mean_ms: 2000.0,
            mean_block_time_ms: 600_000.0,
            max_iterations: 2_000_000,
            seed: Some(7),
            output_root: ".".to_string(),
        }
    }

    #[test]
    fn rejects_too_few_peers() {
        let mut cli = base_cli();
        cli.peers = 3;
        assert!(matches!(SimConfig::from_cli(cli, 0), Err(ConfigError::TooFewPeers(3))));
    }

    #[test]
    fn rejects_adversary_shares_over_100_percent() {
        let mut cli = base_cli();
        cli.zeta1 = 60;
        cli.zeta2 = 60;
        assert!(matches!(SimConfig::from_cli(cli, 0), Err(ConfigError::AdversaryShareTooLarge { .. })));
    }

    #[test]
    fn accepts_valid_config_and_uses_explicit_seed() {
        let cli = base_cli();
        let config = SimConfig::from_cli(cli, 999).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.num_peers, 50);
    }

    #[test]
    fn falls_back_to_provided_seed_when_absent() {
        let mut cli = base_cli();
        cli.seed = None;
        let config = SimConfig::from_cli(cli, 999).unwrap();
        assert_eq!(config.seed, 999);
    }
}
