//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてリースプールのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **PoolBuilder**: プールの構築とワイヤリング
//! - **LeaseRegistry**: トークンの状態機械（create/acquire/release/delete/keep_alive）
//! - **ReaperLoop**: block TTL 切れの回収
//! - **transition**: 状態遷移ごとの WriteBatch（Registry と ReaperLoop で共有）
//! - **status**: 集計と不変条件の監査

pub mod builder;
pub mod config;
pub mod reaper_loop;
pub mod registry;
pub mod status;
pub mod transition;

pub use self::builder::{BuildError, LeasePool, PoolBuilder};
pub use self::config::PoolConfig;
pub use self::reaper_loop::{ReaperLoop, SweepReport, SweeperError};
pub use self::registry::LeaseRegistry;
pub use self::status::{InvariantViolation, PoolCounts};
