//! Persisted layout names used against the lease store.

/// Names of the two membership sets and the per-token record fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    pub available_set: String,
    pub blocked_set: String,
    pub created_field: String,
    pub blocked_field: String,
    /// Random tag written on every acquire; reclaim only matches the lease it observed.
    pub lease_field: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            available_set: "available_keys".to_string(),
            blocked_set: "blocked_keys".to_string(),
            created_field: "created_at".to_string(),
            blocked_field: "blocked_at".to_string(),
            lease_field: "lease".to_string(),
        }
    }
}
