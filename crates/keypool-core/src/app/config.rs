//! PoolConfig - TTL と sweep 間隔

use std::time::Duration;

use crate::domain::KeySpace;

pub const DEFAULT_CREATION_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_BLOCK_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle time since the last keep-alive before a token counts as expired (advisory).
    pub creation_ttl: Duration,

    /// Time a token may stay blocked before the sweeper reclaims it.
    pub block_ttl: Duration,

    /// Pause between two sweeps.
    pub sweep_interval: Duration,

    pub keyspace: KeySpace,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            creation_ttl: DEFAULT_CREATION_TTL,
            block_ttl: DEFAULT_BLOCK_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            keyspace: KeySpace::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PoolConfig::default();
        assert_eq!(config.creation_ttl, Duration::from_secs(300));
        assert_eq!(config.block_ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.keyspace.available_set, "available_keys");
        assert_eq!(config.keyspace.blocked_set, "blocked_keys");
    }
}
