//! InMemoryLeaseStore - 開発用の LeaseStore
//!
//! - 1 つの Mutex で records と sets を守る（commit は前提条件の確認から書き込みまでその中で完結）
//! - Redis の hash / set のセマンティクスに合わせる
//!   （フィールドが 0 個になった hash は存在しない扱い）

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::IteratorRandom;
use tokio::sync::Mutex;

use crate::domain::StoreError;
use crate::ports::{LeaseStore, Precondition, Write, WriteBatch};

#[derive(Debug, Default)]
struct InMemoryStoreState {
    records: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
}

impl InMemoryStoreState {
    fn holds(&self, precondition: &Precondition) -> bool {
        match precondition {
            Precondition::RecordExists { key } => self.records.contains_key(key),
            Precondition::FieldEquals { key, field, value } => self
                .records
                .get(key)
                .and_then(|fields| fields.get(field))
                .is_some_and(|current| current == value),
            Precondition::MemberOf { set, member } => self
                .sets
                .get(set)
                .is_some_and(|members| members.contains(member)),
        }
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::SetField { key, field, value } => {
                self.records.entry(key).or_default().insert(field, value);
            }
            Write::DeleteField { key, field } => {
                if let Some(fields) = self.records.get_mut(&key) {
                    fields.remove(&field);
                    if fields.is_empty() {
                        self.records.remove(&key);
                    }
                }
            }
            Write::DeleteRecord { key } => {
                self.records.remove(&key);
            }
            Write::AddMember { set, member } => {
                self.sets.entry(set).or_default().insert(member);
            }
            Write::RemoveMember { set, member } => {
                if let Some(members) = self.sets.get_mut(&set) {
                    members.remove(&member);
                }
            }
        }
    }

    fn random_member(&self, set: &str) -> Option<String> {
        self.sets
            .get(set)?
            .iter()
            .choose(&mut rand::thread_rng())
            .cloned()
    }
}

/// InMemoryLeaseStore は開発・テスト用の LeaseStore
///
/// Clone は同じストアを共有します。
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeaseStore {
    state: Arc<Mutex<InMemoryStoreState>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn read_record(&self, key: &str) -> Result<Option<HashMap<String, String>>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.records.get(key).cloned())
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn random_member(&self, set: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.random_member(set))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if !batch.preconditions.iter().all(|p| state.holds(p)) {
            return Ok(false);
        }
        for write in batch.writes {
            state.apply(write);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_applies_all_writes() {
        let store = InMemoryLeaseStore::new();
        let batch = WriteBatch::new()
            .set_field("k1", "created_at", "t0")
            .add_member("available", "k1");

        assert!(store.commit(batch).await.unwrap());

        let record = store.read_record("k1").await.unwrap().unwrap();
        assert_eq!(record["created_at"], "t0");
        assert_eq!(store.members("available").await.unwrap(), vec!["k1"]);
    }

    #[tokio::test]
    async fn failed_precondition_writes_nothing() {
        let store = InMemoryLeaseStore::new();
        let batch = WriteBatch::new()
            .require_record("missing")
            .set_field("missing", "created_at", "t0")
            .add_member("available", "missing");

        assert!(!store.commit(batch).await.unwrap());

        assert_eq!(store.read_record("missing").await.unwrap(), None);
        assert!(store.members("available").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn field_equals_compares_current_value() {
        let store = InMemoryLeaseStore::new();
        store
            .commit(WriteBatch::new().set_field("k", "blocked_at", "t1"))
            .await
            .unwrap();

        let stale = WriteBatch::new()
            .require_field("k", "blocked_at", "t0")
            .delete_field("k", "blocked_at");
        assert!(!store.commit(stale).await.unwrap());

        let fresh = WriteBatch::new()
            .require_field("k", "blocked_at", "t1")
            .delete_field("k", "blocked_at");
        assert!(store.commit(fresh).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_last_field_removes_record() {
        let store = InMemoryLeaseStore::new();
        store
            .commit(WriteBatch::new().set_field("k", "blocked_at", "t1"))
            .await
            .unwrap();
        store
            .commit(WriteBatch::new().delete_field("k", "blocked_at"))
            .await
            .unwrap();

        assert_eq!(store.read_record("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn member_precondition_lets_one_of_two_takers_win() {
        let store = InMemoryLeaseStore::new();
        store
            .commit(WriteBatch::new().add_member("available", "k"))
            .await
            .unwrap();
        let take = || {
            WriteBatch::new()
                .require_member("available", "k")
                .remove_member("available", "k")
                .add_member("blocked", "k")
        };

        assert_eq!(store.random_member("available").await.unwrap().as_deref(), Some("k"));
        assert!(store.commit(take()).await.unwrap());
        assert!(!store.commit(take()).await.unwrap());

        assert_eq!(store.random_member("available").await.unwrap(), None);
        assert_eq!(store.members("blocked").await.unwrap(), vec!["k"]);
    }
}
