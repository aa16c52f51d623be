//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryLeaseStore**: 開発用の LeaseStore
//!
//! 本番用のストア（Redis など）は別クレートに配置します。

pub mod inmem_store;

pub use self::inmem_store::InMemoryLeaseStore;
