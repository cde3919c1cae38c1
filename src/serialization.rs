//! Cache entry codec.
//!
//! Entries are stored as JSON strings. Two shapes exist:
//!
//! ```text
//! TTL-governed:       <payload json>
//! Logically expiring: {"data": <payload json>, "expireAt": <unix millis>}
//! ```
//!
//! The null marker is the empty string, which no JSON document can be.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Sentinel stored when the backing store confirmed an id does not exist.
pub const NULL_MARKER: &str = "";

/// A payload plus its optional logical expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub logical_expiry: Option<SystemTime>,
}

impl<T> CacheEntry<T> {
    /// Entry whose liveness is governed by the store's TTL only.
    pub fn new(data: T) -> Self {
        CacheEntry {
            data,
            logical_expiry: None,
        }
    }

    /// Entry that stays live until `expiry`, whatever the store TTL says.
    pub fn with_expiry(data: T, expiry: SystemTime) -> Self {
        CacheEntry {
            data,
            logical_expiry: Some(expiry),
        }
    }

    /// Whether the entry can be served as fresh at `now`.
    ///
    /// Entries without a logical expiry are always live here; the store
    /// evicts them on its own.
    pub fn is_live_at(&self, now: SystemTime) -> bool {
        match self.logical_expiry {
            Some(expiry) => expiry > now,
            None => true,
        }
    }
}

impl<T: Serialize> CacheEntry<T> {
    pub fn encode(&self) -> Result<String> {
        encode(&self.data, self.logical_expiry)
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    /// Decode a logically expiring entry.
    pub fn decode_with_expiry(raw: &str) -> Result<Self> {
        let (data, expiry) = decode_with_expiry(raw)?;
        Ok(CacheEntry::with_expiry(data, expiry))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T> {
    data: &'a T,
    expire_at: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedEnvelope<T> {
    data: T,
    expire_at: u64,
}

/// Encode `payload` for storage, wrapping it with `logical_expiry` if given.
///
/// # Errors
///
/// `Error::SerializationError` if the payload cannot be represented as JSON.
pub fn encode<T: Serialize>(payload: &T, logical_expiry: Option<SystemTime>) -> Result<String> {
    let encoded = match logical_expiry {
        None => serde_json::to_string(payload),
        Some(expiry) => serde_json::to_string(&Envelope {
            data: payload,
            expire_at: to_unix_millis(expiry),
        }),
    };
    encoded.map_err(|e| Error::SerializationError(e.to_string()))
}

/// Decode a bare payload written by `encode(payload, None)`.
///
/// # Errors
///
/// `Error::MalformedEntry` if `raw` is the null marker or not a valid
/// encoding of `T`.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    if is_null_marker(raw) {
        return Err(Error::MalformedEntry(
            "null marker has no payload".to_string(),
        ));
    }
    serde_json::from_str(raw).map_err(|e| Error::MalformedEntry(e.to_string()))
}

/// Decode a wrapped payload written by `encode(payload, Some(expiry))`.
///
/// # Errors
///
/// `Error::MalformedEntry` if `raw` lacks the envelope or the payload does
/// not fit `T`.
pub fn decode_with_expiry<T: DeserializeOwned>(raw: &str) -> Result<(T, SystemTime)> {
    if is_null_marker(raw) {
        return Err(Error::MalformedEntry(
            "null marker has no payload".to_string(),
        ));
    }
    let envelope: OwnedEnvelope<T> =
        serde_json::from_str(raw).map_err(|e| Error::MalformedEntry(e.to_string()))?;
    Ok((envelope.data, from_unix_millis(envelope.expire_at)))
}

pub fn encode_null_marker() -> String {
    NULL_MARKER.to_string()
}

pub fn is_null_marker(raw: &str) -> bool {
    raw == NULL_MARKER
}

fn to_unix_millis(time: SystemTime) -> u64 {
    // Pre-epoch timestamps clamp to 0; they are expired either way.
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn from_unix_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

/// Truncate a timestamp to the precision kept in the envelope.
pub fn truncate_to_millis(time: SystemTime) -> SystemTime {
    from_unix_millis(to_unix_millis(time))
}
