//! トークン ID
//!
//! `key-` + ULID（26 文字）。ストアのレコードキーと集合のメンバーにそのまま使います。
//! ULID の 80-bit ランダム部により、削除済みの ID が再発行されることはありません。
//! 文字列から戻すときは `FromStr`（プレフィックスと ULID の両方を検証）。

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display / FromStr で使うプレフィックス（"key-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "key-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let token_id: TokenId = Id::from(Ulid::new());
/// assert!(token_id.to_string().starts_with("key-"));
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// ParseIdError は文字列から Id への変換エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id {input:?}: expected prefix {prefix:?} followed by a ULID")]
pub struct ParseIdError {
    pub input: String,
    pub prefix: &'static str,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    /// Display の逆変換（"key-01H..." → Id）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdError {
            input: s.to_string(),
            prefix: T::prefix(),
        };
        let raw = s.strip_prefix(T::prefix()).ok_or_else(err)?;
        let ulid = Ulid::from_string(raw).map_err(|_| err())?;
        Ok(Self::from_ulid(ulid))
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Token（lease key）のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {}

impl IdMarker for Token {
    fn prefix() -> &'static str {
        "key-"
    }
}

/// Identifier of a lease token. Also the record key in the store.
pub type TokenId = Id<Token>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn display_and_parse_agree() {
        let ulid = Ulid::new();
        let id = TokenId::from_ulid(ulid);

        let text = id.to_string();
        assert!(text.starts_with("key-"));

        let parsed: TokenId = text.parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.as_ulid(), ulid);
    }

    #[rstest]
    #[case::empty("")]
    #[case::missing_prefix("01ARZ3NDEKTSV4RRFFQ69G5FAV")]
    #[case::wrong_prefix("task-01ARZ3NDEKTSV4RRFFQ69G5FAV")]
    #[case::bad_ulid("key-not-a-ulid")]
    #[case::prefix_only("key-")]
    fn parse_rejects_garbage(#[case] input: &str) {
        let err = input.parse::<TokenId>().unwrap_err();
        assert_eq!(err.input, input);
        assert_eq!(err.prefix, "key-");
    }

    #[test]
    fn wire_form_is_prefix_and_26_chars() {
        let id = TokenId::from_ulid(Ulid::from_string("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap());

        assert_eq!(id.to_string(), "key-01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(id.to_string().len(), "key-".len() + 26);
    }
}
