use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use uuid::Uuid;

/// Gap between two delivered units above which the listener is considered
/// to have stalled (milliseconds).
const DELIVERY_GAP_LOG_THRESHOLD_MS: u64 = 2000;

/// Logs one listener connection's lifecycle and delivery statistics.
///
/// Counters are lock-free on the hot path; the summary is written once when
/// the response body is dropped, which is also when the client went away.
pub struct ListenerGuard {
    id: Uuid,
    epoch: u64,
    client_ip: IpAddr,
    connected_at: Instant,
    units_sent: AtomicU64,
    bytes_sent: AtomicU64,
    /// Elapsed millis since `connected_at` of the last delivered unit (0 = none).
    last_delivery_ms: AtomicU64,
    max_gap_ms: AtomicU64,
    first_error: parking_lot::Mutex<Option<String>>,
}

impl ListenerGuard {
    pub fn new(epoch: u64, client_ip: IpAddr) -> Self {
        let id = Uuid::new_v4();
        log::info!(
            "[Stream] Listener {} connected: epoch={}, client={}",
            id,
            epoch,
            client_ip
        );
        Self {
            id,
            epoch,
            client_ip,
            connected_at: Instant::now(),
            units_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            last_delivery_ms: AtomicU64::new(0),
            max_gap_ms: AtomicU64::new(0),
            first_error: parking_lot::Mutex::new(None),
        }
    }

    /// Records one chunk handed to the HTTP body.
    pub fn record_chunk(&self, len: usize) {
        self.units_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);

        let now_ms = (self.connected_at.elapsed().as_millis() as u64).max(1);
        let prev_ms = self.last_delivery_ms.swap(now_ms, Ordering::Relaxed);
        if prev_ms > 0 {
            self.max_gap_ms
                .fetch_max(now_ms.saturating_sub(prev_ms), Ordering::Relaxed);
        }
    }

    /// Records the first error encountered during delivery.
    pub fn record_error(&self, err: &str) {
        let mut first = self.first_error.lock();
        if first.is_none() {
            *first = Some(err.to_string());
        }
    }

    /// Identifier used in this connection's log lines.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn units_sent(&self) -> u64 {
        self.units_sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let units = self.units_sent.load(Ordering::Relaxed);
        let bytes = self.bytes_sent.load(Ordering::Relaxed);
        let max_gap_ms = self.max_gap_ms.load(Ordering::Relaxed);
        let duration_secs = self.connected_at.elapsed().as_secs();
        let stalled_suffix = if max_gap_ms > DELIVERY_GAP_LOG_THRESHOLD_MS {
            " (stalled)"
        } else {
            ""
        };

        if let Some(ref err) = *self.first_error.get_mut() {
            log::warn!(
                "[Stream] Listener {} disconnected with error{}: epoch={}, client={}, units={}, \
                 bytes={}, duration={}s, max_gap={}ms, error={}",
                self.id,
                stalled_suffix,
                self.epoch,
                self.client_ip,
                units,
                bytes,
                duration_secs,
                max_gap_ms,
                err
            );
        } else {
            log::info!(
                "[Stream] Listener {} disconnected{}: epoch={}, client={}, units={}, bytes={}, \
                 duration={}s, max_gap={}ms",
                self.id,
                stalled_suffix,
                self.epoch,
                self.client_ip,
                units,
                bytes,
                duration_secs,
                max_gap_ms
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn guard_counts_chunks_and_keeps_first_error() {
        let guard = ListenerGuard::new(1, IpAddr::V4(Ipv4Addr::LOCALHOST));
        guard.record_chunk(100);
        guard.record_chunk(28);
        guard.record_error("broken pipe");
        guard.record_error("second error");

        assert_eq!(guard.units_sent(), 2);
        assert_eq!(guard.bytes_sent(), 128);
        assert_eq!(guard.first_error.lock().as_deref(), Some("broken pipe"));

        let other = ListenerGuard::new(1, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(guard.id(), other.id());
    }
}
