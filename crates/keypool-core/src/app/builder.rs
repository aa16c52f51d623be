//! PoolBuilder - ストア・時計・設定のワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に設定を検証し、不正なら BuildError を返す
//! - Registry と Sweeper は同じ Store / Clock / KeySpace を共有する

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;

use super::config::PoolConfig;
use super::reaper_loop::{ReaperLoop, SweeperError};
use super::registry::LeaseRegistry;
use crate::ports::{Clock, LeaseStore, SystemClock};

/// BuildError はプール構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("block TTL must be greater than zero")]
    ZeroBlockTtl,

    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,

    #[error("{0} is too large")]
    TtlOutOfRange(&'static str),

    #[error("available and blocked sets must have different names (both are {0:?})")]
    SetNamesCollide(String),
}

/// PoolBuilder は LeasePool を構築
///
/// # 使用例
/// ```ignore
/// let pool = PoolBuilder::new(InMemoryLeaseStore::new())
///     .block_ttl(Duration::from_secs(60))
///     .build()?;
/// pool.start_sweeper()?;
/// let id = pool.registry().acquire().await?;
/// ```
pub struct PoolBuilder<S, C = SystemClock> {
    store: S,
    clock: C,
    config: PoolConfig,
}

impl<S: LeaseStore> PoolBuilder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: SystemClock,
            config: PoolConfig::default(),
        }
    }
}

impl<S: LeaseStore, C: Clock + Clone> PoolBuilder<S, C> {
    /// Replace the clock (tests use `FixedClock`).
    pub fn clock<C2: Clock + Clone>(self, clock: C2) -> PoolBuilder<S, C2> {
        PoolBuilder {
            store: self.store,
            clock,
            config: self.config,
        }
    }

    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn creation_ttl(mut self, ttl: Duration) -> Self {
        self.config.creation_ttl = ttl;
        self
    }

    pub fn block_ttl(mut self, ttl: Duration) -> Self {
        self.config.block_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Validate the configuration and wire the registry and the sweeper.
    pub fn build(self) -> Result<LeasePool<S, C>, BuildError> {
        let config = self.config;
        if config.block_ttl.is_zero() {
            return Err(BuildError::ZeroBlockTtl);
        }
        if config.sweep_interval.is_zero() {
            return Err(BuildError::ZeroSweepInterval);
        }
        if config.keyspace.available_set == config.keyspace.blocked_set {
            return Err(BuildError::SetNamesCollide(config.keyspace.available_set));
        }
        let creation_ttl = TimeDelta::from_std(config.creation_ttl)
            .map_err(|_| BuildError::TtlOutOfRange("creation TTL"))?;
        let block_ttl = TimeDelta::from_std(config.block_ttl)
            .map_err(|_| BuildError::TtlOutOfRange("block TTL"))?;

        let store = Arc::new(self.store);
        let reaper = ReaperLoop::new(
            Arc::clone(&store),
            self.clock.clone(),
            config.keyspace.clone(),
            block_ttl,
            config.sweep_interval,
        );
        let registry = LeaseRegistry::new(store, self.clock, config.keyspace, creation_ttl);
        Ok(LeasePool { registry, reaper })
    }
}

/// LeasePool は Registry と Sweeper の組
pub struct LeasePool<S, C = SystemClock> {
    registry: LeaseRegistry<S, C>,
    reaper: ReaperLoop<S, C>,
}

impl<S, C> LeasePool<S, C> {
    pub fn registry(&self) -> &LeaseRegistry<S, C> {
        &self.registry
    }

    pub fn reaper(&self) -> &ReaperLoop<S, C> {
        &self.reaper
    }

    pub fn into_registry(self) -> LeaseRegistry<S, C> {
        self.registry
    }
}

impl<S, C> LeasePool<S, C>
where
    S: LeaseStore + 'static,
    C: Clock + Clone + 'static,
{
    /// Spawn the reclamation sweeper. Once per process.
    pub fn start_sweeper(&self) -> Result<JoinHandle<()>, SweeperError> {
        self.reaper.clone().spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KeySpace, LeaseError};
    use crate::impls::InMemoryLeaseStore;
    use crate::ports::FixedClock;
    use chrono::{Duration as ChronoDuration, Utc};
    use rstest::rstest;

    #[test]
    fn test_build_with_defaults() {
        assert!(PoolBuilder::new(InMemoryLeaseStore::new()).build().is_ok());
    }

    #[rstest]
    #[case::zero_block_ttl(PoolConfig { block_ttl: Duration::ZERO, ..PoolConfig::default() })]
    #[case::zero_sweep_interval(PoolConfig { sweep_interval: Duration::ZERO, ..PoolConfig::default() })]
    #[case::huge_creation_ttl(PoolConfig { creation_ttl: Duration::MAX, ..PoolConfig::default() })]
    #[case::same_set_names(PoolConfig {
        keyspace: KeySpace { blocked_set: "available_keys".into(), ..KeySpace::default() },
        ..PoolConfig::default()
    })]
    fn test_build_rejects_invalid_config(#[case] config: PoolConfig) {
        let result = PoolBuilder::new(InMemoryLeaseStore::new())
            .config(config)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_reports_which_ttl_is_too_large() {
        let result = PoolBuilder::new(InMemoryLeaseStore::new())
            .block_ttl(Duration::MAX)
            .build();
        assert!(matches!(result, Err(BuildError::TtlOutOfRange("block TTL"))));
    }

    // The only test in this crate that spawns the sweeper: the guard is process-wide.
    #[tokio::test]
    async fn test_sweeper_reclaims_abandoned_token_in_background() {
        let clock = FixedClock::new(Utc::now());
        let pool = PoolBuilder::new(InMemoryLeaseStore::new())
            .clock(clock.clone())
            .block_ttl(Duration::from_secs(60))
            .sweep_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let registry = pool.registry();

        let id = registry.create().await.unwrap();
        assert_eq!(registry.acquire().await, Ok(id));
        assert_eq!(registry.acquire().await, Err(LeaseError::NoneAvailable));

        let handle = pool.start_sweeper().unwrap();
        assert!(matches!(
            pool.start_sweeper(),
            Err(SweeperError::AlreadyStarted)
        ));

        // not yet past the TTL: several sweeps leave it blocked
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.info(id).await.unwrap().is_blocked);

        clock.advance(ChronoDuration::seconds(61));
        let reacquired = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(id) = registry.acquire().await {
                    return id;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(reacquired, id);
        handle.abort();
    }
}
