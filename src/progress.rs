use std::sync::atomic::{AtomicU32, Ordering};

/// Receives `(processed_blocks, total_blocks)` as chunks are released.
/// Observational only: it cannot slow down or stop the fetch.
pub trait ProgressSink: Send + Sync {
    fn tick(&self, processed_blocks: u64, total_blocks: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn tick(&self, processed_blocks: u64, total_blocks: u64) {
        self(processed_blocks, total_blocks)
    }
}

/// Discards all ticks.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn tick(&self, _processed_blocks: u64, _total_blocks: u64) {}
}

/// Logs progress through `tracing`, at most once per whole percent.
pub struct TracingProgress {
    label: String,
    last_percent: AtomicU32,
}

impl TracingProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_percent: AtomicU32::new(0),
        }
    }
}

impl ProgressSink for TracingProgress {
    fn tick(&self, processed_blocks: u64, total_blocks: u64) {
        let progress = percent(processed_blocks, total_blocks);
        let previous = self.last_percent.swap(progress, Ordering::Relaxed);
        if progress == previous && processed_blocks < total_blocks {
            return;
        }

        tracing::info!(
            label = %self.label,
            processed_blocks,
            total_blocks,
            progress = %format!("{}%", progress),
            "Backfilling block range"
        );
    }
}

fn percent(processed: u64, total: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    ((processed as f64 / total as f64) * 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(200, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
