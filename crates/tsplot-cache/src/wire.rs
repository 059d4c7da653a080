//! The backend wire shape: what the cache asks for and what it is
//! promised in response. The concrete transport (message-broker
//! connection, `slot/query` sub-URI) is out of scope; only the
//! request/response shape is modeled here, behind the [`crate::datasource::Transport`]
//! trait.

use uuid::Uuid;

use crate::fragment::GENERATION_MAX;

/// The backend accepts times in `[1, (48 << 56) - 1]`.
pub const MIN_VALID_TIME: i64 = 1;
pub const MAX_VALID_TIME: i64 = (48i64 << 56) - 1;

/// Clamp `[start, end]` into the backend's valid time range. Returns `None`
/// if the requested range is fully outside the valid range, in which case
/// the caller must short-circuit to an empty result without issuing any
/// backend traffic.
pub fn clamp_time_range(start: i64, end: i64) -> Option<(i64, i64)> {
    if end < MIN_VALID_TIME || start > MAX_VALID_TIME {
        return None;
    }
    Some((start.max(MIN_VALID_TIME), end.min(MAX_VALID_TIME)))
}

/// `{Nonce, Query}`, published to a `slot/query` sub-URI. `nonce` must be
/// unique over outstanding requests.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub nonce: u32,
    pub query: String,
}

/// One element of a data response's `Stats` array. Exactly one element is
/// present per response; all arrays are the same length.
#[derive(Debug, Clone, Default)]
pub struct StatsPayload {
    pub generation: u64,
    pub times: Vec<i64>,
    pub min: Vec<f64>,
    pub mean: Vec<f64>,
    pub max: Vec<f64>,
    pub count: Vec<u64>,
}

impl StatsPayload {
    pub fn empty() -> Self {
        Self {
            generation: GENERATION_MAX,
            ..Default::default()
        }
    }
}

/// One element of a changed-ranges response.
#[derive(Debug, Clone, Copy)]
pub struct ChangedRangePayload {
    pub generation: u64,
    pub start_time: i64,
    pub end_time: i64,
}

/// The flat (uuid, times) presentation used for bracket queries, as
/// opposed to the column-array presentation used for ordinary data
/// responses.
#[derive(Debug, Clone)]
pub struct BracketEntry {
    pub uuid: Uuid,
    pub times: Vec<i64>,
}

/// One of the three response shapes, distinguished on the wire by a
/// payload-object-number field (`2.0.8.2` metadata, `2.0.8.4` data,
/// `2.0.8.8` changed-ranges). Modeled here as a Rust enum instead of
/// carrying the raw numeric field.
#[derive(Debug, Clone)]
pub enum BackendResponse {
    Data { nonce: u32, stats: StatsPayload },
    BracketData { nonce: u32, entries: Vec<BracketEntry> },
    ChangedRanges { nonce: u32, changed: Vec<ChangedRangePayload> },
    Error { nonce: u32, error: String },
}

impl BackendResponse {
    pub fn nonce(&self) -> u32 {
        match self {
            BackendResponse::Data { nonce, .. }
            | BackendResponse::BracketData { nonce, .. }
            | BackendResponse::ChangedRanges { nonce, .. }
            | BackendResponse::Error { nonce, .. } => *nonce,
        }
    }
}

/// Generates unique request nonces: a monotonic counter XORed with a
/// per-process pseudorandom word. Uniqueness over outstanding requests
/// only needs the counter; the XOR keeps the nonce opaque and
/// unpredictable to backends that treat it as such.
#[derive(Debug)]
pub struct NonceGenerator {
    counter: std::sync::atomic::AtomicU32,
    salt: u32,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self {
            counter: std::sync::atomic::AtomicU32::new(0),
            salt: rand::random(),
        }
    }

    pub fn next(&self) -> u32 {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        n ^ self.salt
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique_over_many_calls() {
        let gen = NonceGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(gen.next()));
        }
    }

    #[test]
    fn clamp_rejects_fully_out_of_range() {
        assert_eq!(clamp_time_range(-5, -1), None);
        assert_eq!(clamp_time_range(MAX_VALID_TIME + 1, MAX_VALID_TIME + 100), None);
    }

    #[test]
    fn clamp_trims_partially_out_of_range() {
        assert_eq!(clamp_time_range(-5, 10), Some((MIN_VALID_TIME, 10)));
    }
}
