use crate::domain::ports::ProgressSink;
use std::sync::{Arc, Mutex};

/// Byte-progress accumulator for one transfer. A single upload or download
/// may report deltas from several transport workers at once, so the running
/// total sits behind a lock. Purely an observability sink: dropping it
/// changes nothing about the transfer itself.
pub struct TransferTracker {
    label: String,
    total: u64,
    transferred: Mutex<u64>,
}

impl TransferTracker {
    pub fn new(label: impl Into<String>, total: u64) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            total,
            transferred: Mutex::new(0),
        })
    }

    pub fn add(&self, delta: u64) {
        let mut seen = self.transferred.lock().unwrap_or_else(|e| e.into_inner());
        *seen += delta;
        let percentage = if self.total == 0 {
            100.0
        } else {
            (*seen as f64 / self.total as f64) * 100.0
        };
        tracing::debug!(
            "{}  {} / {}  ({:.2}%)",
            self.label,
            *seen,
            self.total,
            percentage
        );
    }

    pub fn transferred(&self) -> u64 {
        *self.transferred.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Cloneable callback handed to a transfer operation.
    pub fn sink(self: &Arc<Self>) -> ProgressSink {
        let tracker = Arc::clone(self);
        Arc::new(move |delta| tracker.add(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_deltas_to_the_exact_total() {
        let tracker = TransferTracker::new("file.csv", 100);
        tracker.add(40);
        tracker.add(60);
        assert_eq!(tracker.transferred(), 100);
        assert_eq!(tracker.total(), 100);
    }

    #[test]
    fn concurrent_sinks_do_not_lose_updates() {
        let tracker = TransferTracker::new("file.csv", 8 * 1000);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sink = tracker.sink();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    sink(10);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.transferred(), 8 * 1000);
    }

    #[test]
    fn zero_byte_transfers_do_not_divide_by_zero() {
        let tracker = TransferTracker::new("empty", 0);
        tracker.add(0);
        assert_eq!(tracker.transferred(), 0);
    }
}
