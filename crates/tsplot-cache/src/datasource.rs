//! A uniform async interface for the three operations the coordinator
//! needs from the backend: `aligned_windows`, `brackets`, `changed_ranges`.
//!
//! Each operation's callback (here, its `async fn`'s resolution) fires
//! exactly once: instead of passing a continuation, the coordinator simply
//! awaits the future.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::fragment::GENERATION_MAX;
use crate::point::StatPoint;
use crate::wire::{BackendRequest, BackendResponse, NonceGenerator};

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("backend returned an error: {0}")]
    Backend(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response nonce did not match any outstanding request")]
    UnknownNonce,
}

impl tsplot_error::CacheError for DataSourceError {
    fn code(&self) -> tsplot_error::ErrorCode {
        match self {
            DataSourceError::Backend(_) => tsplot_error::ErrorCode::Unavailable,
            DataSourceError::Malformed(_) => tsplot_error::ErrorCode::DataLoss,
            DataSourceError::UnknownNonce => tsplot_error::ErrorCode::Internal,
        }
    }
}

/// Result of `aligned_windows`. `generation == GENERATION_MAX` means "no
/// data"; this is not an error, callers treat it as a valid empty result.
#[derive(Debug, Clone, Default)]
pub struct AlignedWindows {
    pub points: Vec<StatPoint>,
    pub generation: u64,
}

impl AlignedWindows {
    pub fn empty() -> Self {
        Self {
            points: Vec::new(),
            generation: GENERATION_MAX,
        }
    }
}

/// Earliest/latest stored time for one series, used for autoscaling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bracket {
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangedRange {
    pub generation: u64,
    pub start_time: i64,
    pub end_time: i64,
}

/// Uniform async interface the coordinator drives. Backend I/O happens
/// off-thread inside the implementation; its completion is marshaled back
/// onto the coordinator's task before it touches the cache.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn aligned_windows(
        &self,
        uuid: Uuid,
        start: i64,
        end: i64,
        pwe: u8,
    ) -> AlignedWindows;

    async fn brackets(&self, uuids: &[Uuid]) -> HashMap<Uuid, Bracket>;

    async fn changed_ranges(
        &self,
        uuid: Uuid,
        from_generation: u64,
        to_generation: u64,
        pwe: u8,
    ) -> Vec<ChangedRange>;
}

/// A one-shot request/response transport, standing in for the concrete
/// message-broker connection, which is out of scope here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: BackendRequest) -> BackendResponse;
}

/// The reference `DataSource`, built over any [`Transport`]. Demonstrates
/// the wire-level request shape and, in `brackets`, the two-request
/// bracket coordination state machine described in the cache's design:
/// {awaiting-both -> awaiting-one -> complete}, with `gotleft`/`gotright`
/// flags ensuring neither response is processed twice.
pub struct BrokerDataSource<T: Transport> {
    transport: T,
    nonces: NonceGenerator,
}

impl<T: Transport> BrokerDataSource<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            nonces: NonceGenerator::new(),
        }
    }
}

#[async_trait]
impl<T: Transport> DataSource for BrokerDataSource<T> {
    async fn aligned_windows(&self, uuid: Uuid, start: i64, end: i64, pwe: u8) -> AlignedWindows {
        let nonce = self.nonces.next();
        let query = format!("alignedwindows({uuid},{start},{end},{pwe})");
        let response = self.transport.send(BackendRequest { nonce, query }).await;
        match response {
            BackendResponse::Data { stats, .. } => {
                if stats.generation == GENERATION_MAX || stats.times.is_empty() {
                    return AlignedWindows {
                        points: Vec::new(),
                        generation: stats.generation,
                    };
                }
                let points = (0..stats.times.len())
                    .map(|i| {
                        StatPoint::new(
                            stats.times[i],
                            stats.min[i],
                            stats.mean[i],
                            stats.max[i],
                            stats.count[i],
                        )
                    })
                    .collect();
                AlignedWindows {
                    points,
                    generation: stats.generation,
                }
            }
            BackendResponse::Error { error, .. } => {
                tracing::error!(%uuid, %error, "aligned_windows backend error, folding to nodata");
                AlignedWindows::empty()
            }
            other => {
                tracing::error!(?other, "unexpected response shape for aligned_windows");
                AlignedWindows::empty()
            }
        }
    }

    async fn brackets(&self, uuids: &[Uuid]) -> HashMap<Uuid, Bracket> {
        let state = Arc::new(Mutex::new(BracketState {
            gotleft: false,
            gotright: false,
            results: uuids.iter().map(|u| (*u, Bracket::default())).collect(),
        }));

        // Two independent backend requests, correlated only by the shared
        // `state`. Whichever resolves first sets its flag and folds in its
        // half; whichever resolves second observes both flags set and
        // folds in its half too. Neither can double-process its own side.
        let left_nonce = self.nonces.next();
        let right_nonce = self.nonces.next();
        let left_query = format!("databefore(MAX,{uuids:?})");
        let right_query = format!("dataafter(MIN,{uuids:?})");

        let left_state = state.clone();
        let right_state = state.clone();
        let left_fut = {
            let transport = &self.transport;
            async move {
                let response = transport
                    .send(BackendRequest {
                        nonce: left_nonce,
                        query: left_query,
                    })
                    .await;
                apply_bracket_side(&left_state, response, BracketSide::Latest);
            }
        };
        let right_fut = {
            let transport = &self.transport;
            async move {
                let response = transport
                    .send(BackendRequest {
                        nonce: right_nonce,
                        query: right_query,
                    })
                    .await;
                apply_bracket_side(&right_state, response, BracketSide::Earliest);
            }
        };
        tokio::join!(left_fut, right_fut);

        Arc::try_unwrap(state)
            .map(|m| m.into_inner().results)
            .unwrap_or_else(|arc| arc.lock().results.clone())
    }

    async fn changed_ranges(
        &self,
        uuid: Uuid,
        from_generation: u64,
        to_generation: u64,
        pwe: u8,
    ) -> Vec<ChangedRange> {
        let nonce = self.nonces.next();
        let query = format!("changedranges({uuid},{from_generation},{to_generation},{pwe})");
        let response = self.transport.send(BackendRequest { nonce, query }).await;
        match response {
            BackendResponse::ChangedRanges { changed, .. } => changed
                .into_iter()
                .map(|c| ChangedRange {
                    generation: c.generation,
                    start_time: c.start_time,
                    end_time: c.end_time,
                })
                .collect(),
            BackendResponse::Error { error, .. } => {
                tracing::error!(%uuid, %error, "changed_ranges backend error, folding to nodata");
                Vec::new()
            }
            other => {
                tracing::error!(?other, "unexpected response shape for changed_ranges");
                Vec::new()
            }
        }
    }
}

struct BracketState {
    gotleft: bool,
    gotright: bool,
    results: HashMap<Uuid, Bracket>,
}

enum BracketSide {
    Earliest,
    Latest,
}

fn apply_bracket_side(state: &Arc<Mutex<BracketState>>, response: BackendResponse, side: BracketSide) {
    let mut state = state.lock();
    let already_processed = match side {
        BracketSide::Earliest => std::mem::replace(&mut state.gotleft, true),
        BracketSide::Latest => std::mem::replace(&mut state.gotright, true),
    };
    if already_processed {
        // Exactly-one-completion invariant: a side must not be folded in
        // twice even if the transport were to call back again.
        return;
    }
    let entries = match response {
        BackendResponse::BracketData { entries, .. } => entries,
        BackendResponse::Error { error, .. } => {
            tracing::error!(%error, "bracket query backend error, treating as nodata");
            return;
        }
        other => {
            tracing::error!(?other, "unexpected response shape for brackets");
            return;
        }
    };
    for entry in entries {
        let time = match side {
            BracketSide::Earliest => entry.times.iter().min().copied(),
            BracketSide::Latest => entry.times.iter().max().copied(),
        };
        if let Some(bracket) = state.results.get_mut(&entry.uuid) {
            match side {
                BracketSide::Earliest => bracket.earliest = time,
                BracketSide::Latest => bracket.latest = time,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{BracketEntry, StatsPayload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: BackendRequest) -> BackendResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.query.starts_with("alignedwindows") {
                BackendResponse::Data {
                    nonce: request.nonce,
                    stats: StatsPayload {
                        generation: 1,
                        times: vec![0, 16, 32],
                        min: vec![1.0, 2.0, 3.0],
                        mean: vec![1.0, 2.0, 3.0],
                        max: vec![1.0, 2.0, 3.0],
                        count: vec![1, 1, 1],
                    },
                }
            } else if request.query.starts_with("databefore") {
                BackendResponse::BracketData {
                    nonce: request.nonce,
                    entries: vec![],
                }
            } else if request.query.starts_with("dataafter") {
                BackendResponse::BracketData {
                    nonce: request.nonce,
                    entries: vec![],
                }
            } else {
                BackendResponse::Error {
                    nonce: request.nonce,
                    error: "unhandled in fake".into(),
                }
            }
        }
    }

    #[tokio::test]
    async fn aligned_windows_parses_columnar_response() {
        let ds = BrokerDataSource::new(FakeTransport {
            calls: AtomicUsize::new(0),
        });
        let uuid = Uuid::new_v4();
        let result = ds.aligned_windows(uuid, 0, 32, 4).await;
        assert_eq!(result.points.len(), 3);
        assert_eq!(result.generation, 1);
    }

    #[tokio::test]
    async fn brackets_completes_exactly_once_per_uuid() {
        let ds = BrokerDataSource::new(FakeTransport {
            calls: AtomicUsize::new(0),
        });
        let uuid = Uuid::new_v4();
        let result = ds.brackets(&[uuid]).await;
        assert!(result.contains_key(&uuid));
    }
}
