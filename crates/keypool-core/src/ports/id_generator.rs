//! IdGenerator port - ID 生成の抽象化
//!
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::TokenId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はトークン ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから同時に使える）
pub trait IdGenerator: Send + Sync {
    fn generate_token_id(&self) -> TokenId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_token_id(&self) -> TokenId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TokenId::from(ulid)
    }
}
