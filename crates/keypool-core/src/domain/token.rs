//! Token record: the attributes stored per token, and the derived lease state.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use super::errors::StoreError;
use super::ids::TokenId;
use super::keyspace::KeySpace;

/// Fixed-width, lexicographically sortable timestamp format (UTC, microseconds).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// Fresh tag for one blocked period of a token.
///
/// Two acquisitions in the same microsecond share `blocked_at` but never the tag.
pub fn new_lease_tag() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Lease state, derived from `blocked_at` rather than stored as a tag.
///
/// State transitions:
/// - (created) -> Available
/// - Available -> Blocked (acquire)
/// - Blocked -> Available (release, or reclaimed by the sweeper)
/// - Available | Blocked -> (deleted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseState {
    Available,
    Blocked,
}

/// Attributes of a live token as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: TokenId,
    pub created_at: DateTime<Utc>,
    pub blocked_at: Option<DateTime<Utc>>,
    /// Tag of the current blocked period. Absent on available tokens.
    pub lease: Option<String>,
}

impl TokenRecord {
    /// Decode a record from its raw hash fields.
    ///
    /// A record without `created_at` is malformed: every live token carries one.
    pub fn from_fields(
        id: TokenId,
        fields: &HashMap<String, String>,
        keys: &KeySpace,
    ) -> Result<Self, StoreError> {
        let field = |name: &str| -> Result<Option<DateTime<Utc>>, StoreError> {
            fields
                .get(name)
                .map(|raw| {
                    decode_timestamp(raw).map_err(|e| StoreError::Malformed {
                        key: id.to_string(),
                        field: name.to_string(),
                        reason: e.to_string(),
                    })
                })
                .transpose()
        };

        let created_at = field(&keys.created_field)?.ok_or_else(|| StoreError::Malformed {
            key: id.to_string(),
            field: keys.created_field.clone(),
            reason: "missing".to_string(),
        })?;
        let blocked_at = field(&keys.blocked_field)?;

        Ok(Self {
            id,
            created_at,
            blocked_at,
            lease: fields.get(&keys.lease_field).cloned(),
        })
    }

    pub fn state(&self) -> LeaseState {
        match self.blocked_at {
            Some(_) => LeaseState::Blocked,
            None => LeaseState::Available,
        }
    }

    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            is_blocked: self.state() == LeaseState::Blocked,
            blocked_at: self.blocked_at,
            created_at: self.created_at,
        }
    }
}

/// Public view of a token returned by `LeaseRegistry::info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub is_blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use ulid::Ulid;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);

        let a = encode_timestamp(early);
        let b = encode_timestamp(late);

        assert_eq!(a, "2024-01-01T09:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_timestamp(&b).unwrap(), late);
    }

    #[test]
    fn encoding_truncates_to_microseconds() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_234_567);
        let decoded = decode_timestamp(&encode_timestamp(at)).unwrap();
        assert_eq!(decoded.nanosecond(), 1_234_000);
    }

    #[test]
    fn record_without_blocked_at_is_available() {
        let id = TokenId::from_ulid(Ulid::new());
        let keys = KeySpace::default();
        let raw = fields(&[("created_at", "2024-01-01T00:00:00.000000Z")]);

        let record = TokenRecord::from_fields(id, &raw, &keys).unwrap();

        assert_eq!(record.state(), LeaseState::Available);
        let info = record.info();
        assert!(!info.is_blocked);
        assert_eq!(info.blocked_at, None);
    }

    #[test]
    fn record_with_blocked_at_is_blocked() {
        let id = TokenId::from_ulid(Ulid::new());
        let keys = KeySpace::default();
        let raw = fields(&[
            ("created_at", "2024-01-01T00:00:00.000000Z"),
            ("blocked_at", "2024-01-01T00:00:05.000000Z"),
            ("lease", "00000000000000ab"),
        ]);

        let record = TokenRecord::from_fields(id, &raw, &keys).unwrap();

        assert_eq!(record.state(), LeaseState::Blocked);
        assert_eq!(record.lease.as_deref(), Some("00000000000000ab"));
        assert_eq!(
            record.blocked_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap())
        );
    }

    #[test]
    fn missing_created_at_is_malformed() {
        let id = TokenId::from_ulid(Ulid::new());
        let raw = fields(&[("blocked_at", "2024-01-01T00:00:05.000000Z")]);

        let err = TokenRecord::from_fields(id, &raw, &KeySpace::default()).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { field, .. } if field == "created_at"));
    }

    #[test]
    fn unparsable_timestamp_is_malformed() {
        let id = TokenId::from_ulid(Ulid::new());
        let raw = fields(&[("created_at", "yesterday")]);

        let err = TokenRecord::from_fields(id, &raw, &KeySpace::default()).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { key, .. } if key == id.to_string()));
    }

    #[test]
    fn lease_tags_are_fixed_width_and_distinct() {
        let tags: std::collections::HashSet<String> = (0..64).map(|_| new_lease_tag()).collect();

        assert_eq!(tags.len(), 64);
        assert!(tags.iter().all(|tag| tag.len() == 16));
    }

    #[test]
    fn info_serializes_in_camel_case() {
        let info = TokenInfo {
            is_blocked: false,
            blocked_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["isBlocked"], false);
        assert!(json["blockedAt"].is_null());
        assert_eq!(json["createdAt"], "2024-01-01T00:00:00Z");
    }
}
