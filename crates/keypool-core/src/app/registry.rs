//! LeaseRegistry - トークン単位の状態機械
//!
//! # 状態遷移
//! - create:     Nonexistent -> Available
//! - acquire:    Available -> Blocked（available のメンバーであることを前提条件にした CAS）
//! - release:    Blocked -> Available（Available なら何もしない）
//! - delete:     Available | Blocked -> Nonexistent
//! - keep_alive: created_at のみ更新
//!
//! 存在判定は属性レコードの有無のみ（集合のメンバーシップは見ない）。

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, info, warn};

use super::transition;
use crate::domain::{KeySpace, LeaseError, TokenId, TokenInfo, TokenRecord, new_lease_tag};
use crate::ports::{Clock, IdGenerator, LeaseStore, SystemClock, UlidGenerator, WriteBatch};

/// LeaseRegistry はトークンの作成・取得・解放・削除を担う
///
/// プロセス内の状態は持たず、すべての調停は LeaseStore の atomic 操作で行います。
pub struct LeaseRegistry<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    ids: UlidGenerator<C>,
    keys: KeySpace,
    creation_ttl: TimeDelta,
}

impl<S: LeaseStore, C: Clock + Clone> LeaseRegistry<S, C> {
    pub(crate) fn new(store: Arc<S>, clock: C, keys: KeySpace, creation_ttl: TimeDelta) -> Self {
        Self {
            store,
            ids: UlidGenerator::new(clock.clone()),
            clock,
            keys,
            creation_ttl,
        }
    }
}

impl<S: LeaseStore, C: Clock> LeaseRegistry<S, C> {
    pub fn keyspace(&self) -> &KeySpace {
        &self.keys
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Create a new available token.
    pub async fn create(&self) -> Result<TokenId, LeaseError> {
        let id = self.ids.generate_token_id();
        let now = self.clock.now();
        self.store
            .commit(transition::create(&self.keys, id, now))
            .await?;
        info!(token_id = %id, "token created");
        Ok(id)
    }

    /// Take one available token and block it.
    ///
    /// Picks a random available id and commits the block only while that id is
    /// still available. A caller that loses the race for its pick picks again.
    /// Returns `NoneAvailable` immediately when the available set is empty.
    pub async fn acquire(&self) -> Result<TokenId, LeaseError> {
        loop {
            let Some(member) = self.store.random_member(&self.keys.available_set).await? else {
                return Err(LeaseError::NoneAvailable);
            };
            let id = match member.parse::<TokenId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!(member = %member, error = %e, "dropping malformed member of available set");
                    self.drop_available_member(&member).await?;
                    continue;
                }
            };

            let batch = transition::block(&self.keys, id, self.clock.now(), &new_lease_tag());
            if self.store.commit(batch).await? {
                debug!(token_id = %id, "token acquired");
                return Ok(id);
            }
            if self.store.read_record(&member).await?.is_none() {
                // ids are never reused, so a member without a record stays orphaned
                warn!(token_id = %id, "dropping available member without a record");
                self.drop_available_member(&member).await?;
            } else {
                debug!(token_id = %id, "token taken by a concurrent caller, picking again");
            }
        }
    }

    async fn drop_available_member(&self, member: &str) -> Result<(), LeaseError> {
        let batch = WriteBatch::new().remove_member(self.keys.available_set.as_str(), member);
        self.store.commit(batch).await?;
        Ok(())
    }

    pub async fn info(&self, id: TokenId) -> Result<TokenInfo, LeaseError> {
        Ok(self.record(id).await?.info())
    }

    /// Unblock a token. Succeeds for tokens that are already available.
    pub async fn release(&self, id: TokenId) -> Result<(), LeaseError> {
        if !self
            .store
            .commit(transition::release(&self.keys, id))
            .await?
        {
            return Err(LeaseError::NotFound(id));
        }
        debug!(token_id = %id, "token released");
        Ok(())
    }

    pub async fn delete(&self, id: TokenId) -> Result<(), LeaseError> {
        if !self
            .store
            .commit(transition::delete(&self.keys, id))
            .await?
        {
            return Err(LeaseError::NotFound(id));
        }
        info!(token_id = %id, "token deleted");
        Ok(())
    }

    /// Reset the idle clock. Does not touch `blocked_at`, so it never postpones
    /// block-TTL reclamation.
    pub async fn keep_alive(&self, id: TokenId) -> Result<(), LeaseError> {
        let batch = transition::keep_alive(&self.keys, id, self.clock.now());
        if !self.store.commit(batch).await? {
            return Err(LeaseError::NotFound(id));
        }
        debug!(token_id = %id, "token kept alive");
        Ok(())
    }

    /// Advisory idle-expiry check. Missing tokens count as expired.
    ///
    /// Nothing is deleted or reclaimed because of this predicate.
    pub async fn is_expired(&self, id: TokenId) -> Result<bool, LeaseError> {
        match self.record(id).await {
            Ok(record) => Ok(self.clock.now() > record.created_at + self.creation_ttl),
            Err(LeaseError::NotFound(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn record(&self, id: TokenId) -> Result<TokenRecord, LeaseError> {
        let fields = self
            .store
            .read_record(&id.to_string())
            .await?
            .ok_or(LeaseError::NotFound(id))?;
        Ok(TokenRecord::from_fields(id, &fields, &self.keys)?)
    }
}
