//! LeaseStore port - 外部 KV ストア（Redis 相当）の境界
//!
//! LeaseStore は以下を提供します：
//! - トークンごとの属性レコード（hash 相当: field → value）
//! - メンバーシップ集合（available / blocked）
//! - 条件付き書き込みバッチの atomic commit
//! - 集合からのランダム選択（削除はしない）
//!
//! # 実装
//! - **InMemoryLeaseStore**: `impls::inmem_store`（開発・テスト用）

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::StoreError;

/// A condition checked inside the same critical section as the writes it guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The record `key` has at least one field.
    RecordExists { key: String },
    /// `key.field` currently holds exactly `value`.
    FieldEquals {
        key: String,
        field: String,
        value: String,
    },
    /// `member` is in `set`.
    MemberOf { set: String, member: String },
}

/// A single mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    SetField {
        key: String,
        field: String,
        value: String,
    },
    DeleteField { key: String, field: String },
    DeleteRecord { key: String },
    AddMember { set: String, member: String },
    RemoveMember { set: String, member: String },
}

/// WriteBatch は前提条件付きの書き込みの束
///
/// # 設計原則
/// - all-or-nothing（部分適用なし）
/// - 前提条件のチェックと書き込みは同一クリティカルセクション内
///   （Redis の WATCH/MULTI やサーバーサイドスクリプトに相当）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_record(mut self, key: impl Into<String>) -> Self {
        self.preconditions
            .push(Precondition::RecordExists { key: key.into() });
        self
    }

    pub fn require_field(
        mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.preconditions.push(Precondition::FieldEquals {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn require_member(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
        self.preconditions.push(Precondition::MemberOf {
            set: set.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_field(
        mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.writes.push(Write::SetField {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete_field(mut self, key: impl Into<String>, field: impl Into<String>) -> Self {
        self.writes.push(Write::DeleteField {
            key: key.into(),
            field: field.into(),
        });
        self
    }

    pub fn delete_record(mut self, key: impl Into<String>) -> Self {
        self.writes.push(Write::DeleteRecord { key: key.into() });
        self
    }

    pub fn add_member(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
        self.writes.push(Write::AddMember {
            set: set.into(),
            member: member.into(),
        });
        self
    }

    pub fn remove_member(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
        self.writes.push(Write::RemoveMember {
            set: set.into(),
            member: member.into(),
        });
        self
    }
}

/// LeaseStore はリース状態の正本（source of truth）
///
/// # 設計原則
/// - すべての変更は `commit` を通る（プロセス内ロックは使わない）
/// - 読んでから書く操作は、読んだ値を前提条件に入れて commit する
///   （失敗したら読み直し。compare-and-swap）
/// - `Send + Sync`（Registry と Sweeper で共有）
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// All fields of `key`, or `None` if the record does not exist.
    async fn read_record(&self, key: &str) -> Result<Option<HashMap<String, String>>, StoreError>;

    /// Snapshot of the members of `set`.
    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// A random member of `set` without removing it.
    async fn random_member(&self, set: &str) -> Result<Option<String>, StoreError>;

    /// Apply `batch` atomically if every precondition holds.
    ///
    /// Returns `false` (and writes nothing) when a precondition fails.
    async fn commit(&self, batch: WriteBatch) -> Result<bool, StoreError>;
}
