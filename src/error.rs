//! Error types for configuration and simulation failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("need at least 6 peers for the neighbor graph to connect reliably, got {0}")]
    TooFewPeers(usize),
    #[error("adversary hashing shares must not exceed 100%, got zeta1={zeta1} zeta2={zeta2}")]
    AdversaryShareTooLarge { zeta1: u32, zeta2: u32 },
    #[error("mean inter-transaction time must be positive, got {0}ms")]
    NonPositiveTxnInterval(f64),
    #[error("mean block time must be positive, got {0}ms")]
    NonPositiveBlockTime(f64),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to write analysis output: {0}")]
    Output(#[from] std::io::Error),
}
