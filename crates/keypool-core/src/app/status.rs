//! Status - プールの集計と不変条件の監査

use std::collections::HashSet;

use serde::Serialize;

use super::registry::LeaseRegistry;
use crate::domain::{LeaseError, LeaseState, TokenId};
use crate::ports::{Clock, LeaseStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolCounts {
    pub available: usize,
    pub blocked: usize,
}

/// A pool invariant that does not hold for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// I1: member of both sets.
    InBothSets(String),
    /// I2: in the blocked set without `blocked_at`.
    BlockedWithoutTimestamp(String),
    /// I3: in the available set with `blocked_at`.
    AvailableWithTimestamp(String),
    /// I4: in a set without an attribute record.
    MissingRecord(String),
    /// A set member that is not a token id.
    MalformedMember(String),
}

impl<S: LeaseStore, C: Clock> LeaseRegistry<S, C> {
    pub async fn counts(&self) -> Result<PoolCounts, LeaseError> {
        let keys = self.keyspace();
        Ok(PoolCounts {
            available: self.store().members(&keys.available_set).await?.len(),
            blocked: self.store().members(&keys.blocked_set).await?.len(),
        })
    }

    /// Check I1-I4 over a snapshot of both sets.
    ///
    /// The snapshot is not atomic across members, so a concurrent operation can
    /// show up as a transient violation. Run on a quiet pool for a strict answer.
    pub async fn audit(&self) -> Result<Vec<InvariantViolation>, LeaseError> {
        let keys = self.keyspace();
        let available: HashSet<String> = self
            .store()
            .members(&keys.available_set)
            .await?
            .into_iter()
            .collect();
        let blocked: HashSet<String> = self
            .store()
            .members(&keys.blocked_set)
            .await?
            .into_iter()
            .collect();

        let mut violations = Vec::new();
        for member in available.intersection(&blocked) {
            violations.push(InvariantViolation::InBothSets(member.clone()));
        }

        let members = available
            .iter()
            .map(|m| (m, LeaseState::Available))
            .chain(blocked.iter().map(|m| (m, LeaseState::Blocked)));
        for (member, expected) in members {
            let Ok(id) = member.parse::<TokenId>() else {
                violations.push(InvariantViolation::MalformedMember(member.clone()));
                continue;
            };
            let record = match self.record(id).await {
                Ok(record) => record,
                Err(LeaseError::NotFound(_)) => {
                    violations.push(InvariantViolation::MissingRecord(member.clone()));
                    continue;
                }
                Err(e) => return Err(e),
            };
            match (expected, record.state()) {
                (LeaseState::Blocked, LeaseState::Available) => violations.push(
                    InvariantViolation::BlockedWithoutTimestamp(member.clone()),
                ),
                (LeaseState::Available, LeaseState::Blocked) => violations.push(
                    InvariantViolation::AvailableWithTimestamp(member.clone()),
                ),
                _ => {}
            }
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::PoolBuilder;
    use crate::impls::InMemoryLeaseStore;
    use crate::ports::WriteBatch;

    #[tokio::test]
    async fn audit_reports_each_broken_invariant() {
        let store = InMemoryLeaseStore::new();
        let registry = PoolBuilder::new(store.clone()).build().unwrap().into_registry();
        let keys = registry.keyspace().clone();

        let both = registry.create().await.unwrap().to_string();
        let stamped = registry.create().await.unwrap().to_string();
        let unstamped = registry.create().await.unwrap();
        registry.acquire().await.unwrap();
        // whichever token got blocked, release it again so the setup is deterministic
        for id in store.members(&keys.blocked_set).await.unwrap() {
            registry.release(id.parse().unwrap()).await.unwrap();
        }

        let corrupt = WriteBatch::new()
            .add_member(keys.blocked_set.as_str(), both.as_str())
            .set_field(both.as_str(), keys.blocked_field.as_str(), "2024-01-01T00:00:00.000000Z")
            .set_field(stamped.as_str(), keys.blocked_field.as_str(), "2024-01-01T00:00:00.000000Z")
            .remove_member(keys.available_set.as_str(), unstamped.to_string())
            .add_member(keys.blocked_set.as_str(), unstamped.to_string())
            .add_member(keys.available_set.as_str(), "key-00000000000000000000000000")
            .add_member(keys.available_set.as_str(), "garbage");
        store.commit(corrupt).await.unwrap();

        let violations = registry.audit().await.unwrap();

        assert!(violations.contains(&InvariantViolation::InBothSets(both.clone())));
        assert!(violations.contains(&InvariantViolation::AvailableWithTimestamp(stamped)));
        assert!(violations.contains(&InvariantViolation::BlockedWithoutTimestamp(
            unstamped.to_string()
        )));
        assert!(violations.contains(&InvariantViolation::MissingRecord(
            "key-00000000000000000000000000".to_string()
        )));
        assert!(violations.contains(&InvariantViolation::MalformedMember("garbage".to_string())));
    }

    #[tokio::test]
    async fn counts_track_both_sets() {
        let registry = PoolBuilder::new(InMemoryLeaseStore::new())
            .build()
            .unwrap()
            .into_registry();
        for _ in 0..3 {
            registry.create().await.unwrap();
        }
        registry.acquire().await.unwrap();

        assert_eq!(
            registry.counts().await.unwrap(),
            PoolCounts {
                available: 2,
                blocked: 1,
            }
        );
    }
}
