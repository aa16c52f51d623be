//! Transition - 状態遷移ごとの WriteBatch
//!
//! Registry と Sweeper は同じ関数から batch を組み立てます。
//! release の意味が両者でずれないようにするためです。

use chrono::{DateTime, Utc};

use crate::domain::{KeySpace, TokenId, encode_timestamp};
use crate::ports::WriteBatch;

/// Nonexistent -> Available
pub fn create(keys: &KeySpace, id: TokenId, now: DateTime<Utc>) -> WriteBatch {
    let key = id.to_string();
    WriteBatch::new()
        .set_field(key.as_str(), keys.created_field.as_str(), encode_timestamp(now))
        .add_member(keys.available_set.as_str(), key)
}

/// Available -> Blocked, taking the id out of the available set in the same batch.
///
/// Applies only while the id is still available, so two acquirers that picked the
/// same id cannot both win, and a release landing in between has nothing to undo.
pub fn block(keys: &KeySpace, id: TokenId, now: DateTime<Utc>, lease: &str) -> WriteBatch {
    let key = id.to_string();
    WriteBatch::new()
        .require_record(key.as_str())
        .require_member(keys.available_set.as_str(), key.as_str())
        .remove_member(keys.available_set.as_str(), key.as_str())
        .set_field(key.as_str(), keys.blocked_field.as_str(), encode_timestamp(now))
        .set_field(key.as_str(), keys.lease_field.as_str(), lease)
        .add_member(keys.blocked_set.as_str(), key)
}

/// Blocked -> Available. Also a no-op repair for tokens that are already available.
pub fn release(keys: &KeySpace, id: TokenId) -> WriteBatch {
    release_writes(keys, id, WriteBatch::new().require_record(id.to_string()))
}

/// Blocked -> Available, only if the observed lease is still the current one.
///
/// Records blocked before lease tags existed carry no tag; for those the raw
/// `blocked_at` is the only guard.
pub fn reclaim(
    keys: &KeySpace,
    id: TokenId,
    observed_blocked_at: &str,
    observed_lease: Option<&str>,
) -> WriteBatch {
    let key = id.to_string();
    let mut guard = WriteBatch::new()
        .require_field(key.as_str(), keys.blocked_field.as_str(), observed_blocked_at)
        .require_member(keys.blocked_set.as_str(), key.as_str());
    if let Some(lease) = observed_lease {
        guard = guard.require_field(key, keys.lease_field.as_str(), lease);
    }
    release_writes(keys, id, guard)
}

/// Available | Blocked -> Nonexistent
pub fn delete(keys: &KeySpace, id: TokenId) -> WriteBatch {
    let key = id.to_string();
    WriteBatch::new()
        .require_record(key.as_str())
        .delete_record(key.as_str())
        .remove_member(keys.available_set.as_str(), key.as_str())
        .remove_member(keys.blocked_set.as_str(), key)
}

/// Reset the idle clock. Block state is untouched.
pub fn keep_alive(keys: &KeySpace, id: TokenId, now: DateTime<Utc>) -> WriteBatch {
    let key = id.to_string();
    WriteBatch::new()
        .require_record(key.as_str())
        .set_field(key, keys.created_field.as_str(), encode_timestamp(now))
}

fn release_writes(keys: &KeySpace, id: TokenId, batch: WriteBatch) -> WriteBatch {
    let key = id.to_string();
    batch
        .delete_field(key.as_str(), keys.blocked_field.as_str())
        .delete_field(key.as_str(), keys.lease_field.as_str())
        .add_member(keys.available_set.as_str(), key.as_str())
        .remove_member(keys.blocked_set.as_str(), key)
}
