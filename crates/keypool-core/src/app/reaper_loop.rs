//! ReaperLoop - block TTL を過ぎたトークンの回収
//!
//! # フロー
//! 1. blocked 集合のスナップショットを取る
//! 2. 各メンバーのレコードを読む（消えていれば skip）
//! 3. `now > blocked_at + block_ttl` なら release と同じ遷移を commit
//!    （観測した blocked_at と lease タグが変わっていない場合のみ）
//! 4. sweep_interval だけ待って 1 に戻る
//!
//! 1 トークンのストア障害は記録して次へ進みます。ループ自体は終了しません。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::transition;
use crate::domain::{KeySpace, StoreError, TokenId, TokenRecord};
use crate::ports::{Clock, LeaseStore};

/// Set once the first sweeper of this process has been spawned.
static SWEEPER_STARTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error("a sweeper is already running in this process")]
    AlreadyStarted,
}

/// Result of one pass over the blocked set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub reclaimed: usize,
    /// Still within the block TTL.
    pub held: usize,
    /// Released, deleted, or re-blocked since the snapshot.
    pub skipped: usize,
    pub failed: usize,
}

enum Inspection {
    Reclaimed,
    Held,
    Skipped,
}

/// ReaperLoop は block TTL を強制する常駐タスク
pub struct ReaperLoop<S, C> {
    store: Arc<S>,
    clock: C,
    keys: KeySpace,
    block_ttl: TimeDelta,
    interval: Duration,
}

impl<S, C: Clone> Clone for ReaperLoop<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: self.clock.clone(),
            keys: self.keys.clone(),
            block_ttl: self.block_ttl,
            interval: self.interval,
        }
    }
}

impl<S: LeaseStore, C: Clock> ReaperLoop<S, C> {
    pub(crate) fn new(
        store: Arc<S>,
        clock: C,
        keys: KeySpace,
        block_ttl: TimeDelta,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            keys,
            block_ttl,
            interval,
        }
    }

    /// One pass over a snapshot of the blocked set.
    ///
    /// Fails only when the snapshot itself cannot be taken.
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let snapshot = self.store.members(&self.keys.blocked_set).await?;
        let mut report = SweepReport::default();

        for member in snapshot {
            report.scanned += 1;
            match self.inspect(&member).await {
                Ok(Inspection::Reclaimed) => report.reclaimed += 1,
                Ok(Inspection::Held) => report.held += 1,
                Ok(Inspection::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(member = %member, error = %e, "sweep failed for token, will retry next pass");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn inspect(&self, member: &str) -> Result<Inspection, StoreError> {
        let Ok(id) = member.parse::<TokenId>() else {
            warn!(member = %member, "blocked set holds a malformed member");
            return Ok(Inspection::Skipped);
        };
        let Some(fields) = self.store.read_record(member).await? else {
            return Ok(Inspection::Skipped);
        };
        let Some(raw_blocked_at) = fields.get(&self.keys.blocked_field) else {
            return Ok(Inspection::Skipped);
        };
        let record = TokenRecord::from_fields(id, &fields, &self.keys)?;
        let Some(blocked_at) = record.blocked_at else {
            return Ok(Inspection::Skipped);
        };

        if self.clock.now() <= blocked_at + self.block_ttl {
            return Ok(Inspection::Held);
        }

        let batch = transition::reclaim(&self.keys, id, raw_blocked_at, record.lease.as_deref());
        if !self.store.commit(batch).await? {
            debug!(token_id = %id, "token changed since the snapshot, not reclaimed");
            return Ok(Inspection::Skipped);
        }
        info!(token_id = %id, blocked_at = %blocked_at, "reclaimed token past block TTL");
        Ok(Inspection::Reclaimed)
    }
}

impl<S, C> ReaperLoop<S, C>
where
    S: LeaseStore + 'static,
    C: Clock + 'static,
{
    /// Sweep forever, one pass every `interval`.
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(report) if report.reclaimed > 0 || report.failed > 0 => {
                    debug!(
                        scanned = report.scanned,
                        reclaimed = report.reclaimed,
                        failed = report.failed,
                        "sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "sweep could not read the blocked set"),
            }
        }
    }

    /// Start the sweeper on the tokio runtime.
    ///
    /// Only one sweeper may run per process; later calls fail with
    /// `SweeperError::AlreadyStarted`.
    pub fn spawn(self) -> Result<JoinHandle<()>, SweeperError> {
        if SWEEPER_STARTED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SweeperError::AlreadyStarted);
        }
        info!(
            interval_ms = self.interval.as_millis() as u64,
            block_ttl_secs = self.block_ttl.num_seconds(),
            "starting reclamation sweeper"
        );
        Ok(tokio::spawn(self.run()))
    }
}
