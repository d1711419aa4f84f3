use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::ApiError;
use crate::error::TtsError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Where a synthesis request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Validating,
    Pipelining,
    Streaming,
    Complete,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestPhase::Complete | RequestPhase::Failed)
    }

    pub fn can_advance_to(self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Received, Validating)
            | (Validating, Pipelining)
            | (Pipelining, Streaming)
            | (Streaming, Complete) => true,
            _ => false,
        }
    }
}

/// Tracks and logs one request's phase transitions.
#[derive(Debug)]
pub struct RequestTracker {
    id: u64,
    phase: RequestPhase,
    started: Instant,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            phase: RequestPhase::Received,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Move to `next`. Illegal transitions are refused and leave the phase
    /// unchanged.
    pub fn advance(&mut self, next: RequestPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            log::warn!(
                "request {}: refused transition {:?} -> {:?}",
                self.id,
                self.phase,
                next
            );
            return false;
        }
        log::debug!("request {}: {:?} -> {:?}", self.id, self.phase, next);
        self.phase = next;
        if next == RequestPhase::Complete {
            log::info!(
                "request {} complete in {:.2?}",
                self.id,
                self.started.elapsed()
            );
        }
        true
    }

    /// Mark the request failed and log `err`. For failures that can no
    /// longer become a response, such as a stream already on the wire.
    pub fn record_failure(&mut self, err: &TtsError) {
        let phase = self.phase;
        self.advance(RequestPhase::Failed);
        match err {
            TtsError::SynthesisFailure(_) => {
                log::error!("request {} failed while {:?}: {err}", self.id, phase)
            }
            _ => log::info!("request {} rejected while {:?}: {err}", self.id, phase),
        }
    }

    /// Mark the request failed and turn `err` into a response.
    pub fn fail(&mut self, err: TtsError) -> ApiError {
        self.record_failure(&err);
        ApiError(err)
    }
}
