//! keypool-core
//!
//! Lease pool with automatic expiry reclamation.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, token, keyspace, errors）
//! - **ports**: 抽象化レイヤー（LeaseStore, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, registry, reaper_loop, transition, status）
//! - **impls**: 実装（InMemoryLeaseStore）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{LeasePool, LeaseRegistry, PoolBuilder, PoolConfig};
pub use domain::{LeaseError, StoreError, TokenId, TokenInfo};
