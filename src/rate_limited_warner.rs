use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval between cancellation warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Rate limits warnings about batches handed back to the pipeline.
///
/// Callers count events with [`record`](Self::record); [`warn_if_due`]
/// reports the accumulated count at most once per interval and [`flush`]
/// reports it immediately.
///
/// [`warn_if_due`]: Self::warn_if_due
/// [`flush`]: Self::flush
#[derive(Debug)]
pub struct RateLimitedWarner {
    origin: Instant,
    interval: Duration,
    /// Milliseconds since `origin`, offset by one so zero means "never".
    last_warn: AtomicU64,
    pending: AtomicU64,
}

impl RateLimitedWarner {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval,
            last_warn: AtomicU64::new(0),
            pending: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX) + 1
    }

    pub fn record(&self, count: u64) {
        self.pending.fetch_add(count, Ordering::Relaxed);
    }

    /// Emit a warning if the interval has elapsed since the previous one.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = self.now_ms();
        let prev = self.last_warn.load(Ordering::Relaxed);
        let interval = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        if prev != 0 && now.saturating_sub(prev) < interval {
            return;
        }
        if self
            .last_warn
            .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
        }
    }

    /// Report any pending count immediately.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(self.now_ms(), Ordering::Relaxed);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_first_warning_immediately() {
        let warner = RateLimitedWarner::default();
        let mut warnings = Vec::new();
        warner.record(2);
        warner.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![2]);
    }

    #[test]
    fn rate_limits_subsequent_warnings() {
        let warner = RateLimitedWarner::default();
        let mut warnings = Vec::new();
        warner.record(1);
        warner.warn_if_due(|c| warnings.push(c));
        warner.record(1);
        warner.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
    }

    #[test]
    fn zero_interval_never_suppresses() {
        let warner = RateLimitedWarner::new(Duration::ZERO);
        let mut warnings = Vec::new();
        for _ in 0..3 {
            warner.record(1);
            warner.warn_if_due(|c| warnings.push(c));
        }
        assert_eq!(warnings, vec![1, 1, 1]);
    }

    #[test]
    fn flush_emits_pending_warning() {
        let warner = RateLimitedWarner::default();
        let mut warnings = Vec::new();
        warner.record(1);
        warner.warn_if_due(|c| warnings.push(c));
        warner.record(4);
        warner.flush(|c| warnings.push(c));
        assert_eq!(warnings, vec![1, 4]);
    }
}
