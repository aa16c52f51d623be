//! Errors - エラー型と分類
//!
//! - `LeaseError`: Registry の操作結果（NotFound / NoneAvailable / Store）
//! - `StoreError`: LeaseStore（外部 KV ストア）の障害

use thiserror::Error;

use super::ids::TokenId;

/// ErrorKind は LeaseError の運用分類
///
/// - NotFound / NoneAvailable: リソース不在（リトライ不要、呼び出し側に返す）
/// - Infrastructure: ストア障害（この呼び出しは失敗、Sweeper は次回に再試行）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NoneAvailable,
    Infrastructure,
}

/// StoreError は LeaseStore の障害
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    /// The store returned data that does not fit the persisted layout.
    #[error("malformed value in {key}.{field}: {reason}")]
    Malformed {
        key: String,
        field: String,
        reason: String,
    },
}

/// LeaseError は Registry 操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    #[error("token not found: {0}")]
    NotFound(TokenId),

    #[error("no available token")]
    NoneAvailable,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LeaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaseError::NotFound(_) => ErrorKind::NotFound,
            LeaseError::NoneAvailable => ErrorKind::NoneAvailable,
            LeaseError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Absence of a resource (maps to a "not found" class response).
    pub fn is_absence(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::NoneAvailable)
    }
}
