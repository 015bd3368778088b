// src/rate_gate.rs

use crate::error::{Result, SnapshotError};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Caps outbound requests to one upstream endpoint at `max_requests` per `window`.
///
/// Requests are spaced evenly (one cell every `window / max_requests`), so no
/// half-open interval of length `window` ever sees more than `max_requests`
/// admissions. Callers over the limit wait in `acquire` rather than failing.
///
/// The limiter state is lock-free and safe to share between concurrent tasks;
/// clone the surrounding `Arc` instead of building a second gate for the same
/// endpoint.
pub struct RateGate {
    limiter: DefaultDirectRateLimiter,
}

impl RateGate {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        let max = NonZeroU32::new(max_requests).ok_or_else(|| {
            SnapshotError::InvalidConfig("rate gate max_requests must be non-zero".to_string())
        })?;
        let period = window / max.get();
        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                SnapshotError::InvalidConfig(format!(
                    "rate gate window {:?} too small for {} requests",
                    window, max_requests
                ))
            })?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Waits until the gate admits one more request.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

/// One `RateGate` per upstream URL, created on first use.
///
/// Every adapter that talks to the same endpoint gets the same gate, which keeps
/// the limit global for the process instead of per call site.
pub struct RateGateRegistry {
    gates: Mutex<HashMap<String, Arc<RateGate>>>,
    max_requests: u32,
    window: Duration,
}

impl RateGateRegistry {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        // Validate once so `gate_for` can't fail later on a bad quota
        RateGate::new(max_requests, window)?;
        Ok(Self {
            gates: Mutex::new(HashMap::new()),
            max_requests,
            window,
        })
    }

    pub fn gate_for(&self, endpoint: &str) -> Result<Arc<RateGate>> {
        let mut gates = self
            .gates
            .lock()
            .map_err(|_| SnapshotError::InvalidConfig("rate gate registry poisoned".to_string()))?;
        if let Some(gate) = gates.get(endpoint) {
            return Ok(Arc::clone(gate));
        }
        debug!(
            "Creating rate gate for {} ({} req / {:?})",
            endpoint, self.max_requests, self.window
        );
        let gate = Arc::new(RateGate::new(self.max_requests, self.window)?);
        gates.insert(endpoint.to_string(), Arc::clone(&gate));
        Ok(gate)
    }

    pub fn len(&self) -> usize {
        self.gates.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_zero_requests_rejected() {
        assert!(matches!(
            RateGate::new(0, Duration::from_secs(1)),
            Err(SnapshotError::InvalidConfig(_))
        ));
        assert!(RateGate::new(5, Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_gate_spaces_requests() {
        // 5 per 100ms => one every 20ms
        let gate = RateGate::new(5, Duration::from_millis(100)).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            gate.acquire().await;
        }
        assert!(
            start.elapsed() >= Duration::from_millis(35),
            "third request admitted too early: {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_registry_shares_gate_per_endpoint() {
        let registry = RateGateRegistry::new(5, Duration::from_secs(1)).unwrap();
        let a1 = registry.gate_for("https://a.example/graphql").unwrap();
        let a2 = registry.gate_for("https://a.example/graphql").unwrap();
        let b = registry.gate_for("https://b.example/graphql").unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(registry.len(), 2);
    }
}
