//! Lifecycle timestamp formatting.
//!
//! Node timestamps are stored as RFC 3339 strings in UTC with second
//! precision (`2024-01-02T03:04:05Z`), the same shape the Kubernetes API
//! serializes `metav1.Time` in.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::KubegraphError;

/// Format an instant for a node's `startTime` / `endTime` field.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored lifecycle timestamp back into an instant.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, KubegraphError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| KubegraphError::Timestamp {
            value: value.to_string(),
            source,
        })
}
