//! Loader doubles that count their calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Counts calls and answers from a fixed table.
#[derive(Clone, Default)]
pub struct CountingLoader {
    calls: Arc<AtomicU32>,
    delay: Duration,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Arc::default(),
            delay,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Price lookup: only `sku:42` exists.
    pub async fn fetch(&self, key: &str) -> Result<Option<u64>, std::io::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok((key == "sku:42").then_some(1999))
    }
}
