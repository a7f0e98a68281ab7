use hakobu_types::TransferProgress;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked as bytes go out. Cloned into concurrent transfers.
///
/// Figures count bytes handed to the transport, not bytes acknowledged by
/// the remote end: a dropped connection can leave a caller having seen
/// 100% for a transfer that then fails. Success is the operation's
/// `Result`, not the percentage.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

pub fn noop_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// Sums byte counts across concurrent transfers so a caller sees one
/// overall figure. One slot per asset; each transfer writes only its own
/// slot, so slots need no cross-asset locking.
pub struct ProgressAggregator {
    slots: Vec<Slot>,
}

struct Slot {
    sent: AtomicU64,
    total: u64,
}

impl ProgressAggregator {
    pub fn new(totals: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            slots: totals
                .iter()
                .map(|&total| Slot {
                    sent: AtomicU64::new(0),
                    total,
                })
                .collect(),
        })
    }

    /// Records the absolute byte count for one slot. `fetch_max` keeps the
    /// per-slot figure monotone even if callbacks race.
    pub fn record(&self, index: usize, bytes_sent: u64) {
        self.slots[index].sent.fetch_max(bytes_sent, Ordering::Relaxed);
    }

    pub fn overall(&self) -> TransferProgress {
        let bytes_sent = self
            .slots
            .iter()
            .map(|slot| slot.sent.load(Ordering::Relaxed))
            .sum();
        let bytes_total = self.slots.iter().map(|slot| slot.total).sum();
        TransferProgress {
            bytes_sent,
            bytes_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn aggregates_across_assets() {
        // 100MB and 300MB assets, at 50MB and 150MB sent: exactly 50%.
        let agg = ProgressAggregator::new(&[100 * MB, 300 * MB]);
        agg.record(0, 50 * MB);
        agg.record(1, 150 * MB);

        let overall = agg.overall();
        assert_eq!(overall.bytes_sent, 200 * MB);
        assert_eq!(overall.bytes_total, 400 * MB);
        assert_eq!(overall.percent(), 50);
    }

    #[test]
    fn per_slot_progress_is_monotone() {
        let agg = ProgressAggregator::new(&[100]);
        agg.record(0, 60);
        agg.record(0, 40); // late or reordered callback must not regress
        assert_eq!(agg.overall().bytes_sent, 60);
    }

    #[test]
    fn empty_aggregator_reports_zero() {
        let agg = ProgressAggregator::new(&[]);
        assert_eq!(agg.overall().percent(), 0);
    }
}
