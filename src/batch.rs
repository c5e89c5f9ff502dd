use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::engine::CoordinatorApi;
use crate::metrics::WorkerStats;
use crate::offset::OffsetStream;
use crate::pow;
use crate::types::{SubmitStatus, Template};

/// Nonces hashed between stop-flag checks inside one batch.
const SCAN_CHUNK: u64 = 65_536;

/// Scan `[base, base + size)` and return the lowest qualifying nonce with
/// its digest, plus the number of digests actually computed.
pub fn scan_batch(
    header: &[u8],
    difficulty_bits: u32,
    base: u64,
    size: u64,
) -> (u64, Option<(u64, [u8; 32])>) {
    let mut tested = 0u64;
    for i in 0..size {
        let nonce = base.wrapping_add(i);
        let digest = pow::digest(header, nonce);
        tested += 1;
        if pow::meets_difficulty(&digest, difficulty_bits) {
            // Ascending scan: the first hit is the lowest in the range.
            return (tested, Some((nonce, digest)));
        }
    }
    (tested, None)
}

/// Batched searcher: evaluates contiguous nonce ranges of a configured size
/// and submits the lowest qualifying candidate per range. The base always
/// advances by the batch size, so successive batches never overlap; a
/// template change draws a fresh random base.
pub struct BatchSearchEngine<C: CoordinatorApi> {
    api: C,
    miner_id: String,
    batch_size: u64,
    refresh_batches: u64,
    stop: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    offsets: OffsetStream,
    template: Option<Template>,
    base: u64,
    batches_since_refresh: u64,
    unreported_attempts: u64,
}

impl<C: CoordinatorApi> BatchSearchEngine<C> {
    /// `refresh_batches = 0` disables proactive refresh.
    pub fn new(
        api: C,
        miner_id: &str,
        batch_size: u64,
        refresh_batches: u64,
        stop: Arc<AtomicBool>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            api,
            miner_id: miner_id.to_string(),
            batch_size,
            refresh_batches,
            stop,
            stats,
            offsets: OffsetStream::new(miner_id),
            template: None,
            base: 0,
            batches_since_refresh: 0,
            unreported_attempts: 0,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        while !self.stop.load(Ordering::Relaxed) {
            self.step().await;
        }
        log::info!("[{}] batch loop stopped", self.miner_id);
        Ok(())
    }

    /// One full batch plus the follow-up it triggers (submit or refresh).
    async fn step(&mut self) {
        let Some(tpl) = self.template.clone() else {
            return self.refetch().await;
        };

        let batch_base = self.base;
        let mut found = None;
        let mut offset = 0u64;
        while offset < self.batch_size {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            let chunk = SCAN_CHUNK.min(self.batch_size - offset);
            let (tested, hit) = scan_batch(
                &tpl.header,
                tpl.difficulty_bits,
                batch_base.wrapping_add(offset),
                chunk,
            );
            self.unreported_attempts += tested;
            self.stats.record_attempts(tested);
            if hit.is_some() {
                found = hit;
                break;
            }
            offset += chunk;
        }

        self.batches_since_refresh += 1;
        self.base = batch_base.wrapping_add(self.batch_size);

        if let Some((nonce, _digest)) = found {
            self.stats.record_solution_found();
            self.submit_and_handle(tpl.generation, nonce).await;
        } else if self.refresh_batches > 0 && self.batches_since_refresh >= self.refresh_batches {
            self.refetch().await;
        }
    }

    async fn submit_and_handle(&mut self, generation: u64, nonce: u64) {
        match self.api.submit(generation, nonce).await {
            Ok(SubmitStatus::Accepted) => {
                self.stats.record_accepted();
                log::info!(
                    "[{}] solution accepted: generation {generation}, nonce {nonce}",
                    self.miner_id
                );
                self.refetch().await;
            }
            Ok(SubmitStatus::RejectedStale) => {
                self.stats.record_rejected_stale();
                log::debug!(
                    "[{}] solution for generation {generation} was stale",
                    self.miner_id
                );
                self.refetch().await;
            }
            Ok(SubmitStatus::RejectedInvalid) => {
                self.stats.record_rejected_invalid();
                log::warn!(
                    "[{}] coordinator rejected nonce {nonce} for generation {generation} as invalid, refetching",
                    self.miner_id
                );
                self.refetch().await;
            }
            Err(err) => {
                self.stats.record_transport_error();
                log::warn!("[{}] submit failed: {err:#}, dropping candidate", self.miner_id);
            }
        }
    }

    async fn refetch(&mut self) {
        match self.api.fetch_template(self.unreported_attempts).await {
            Ok(tpl) => {
                self.unreported_attempts = 0;
                self.stats.record_template_fetch();
                self.adopt(tpl);
            }
            Err(err) => {
                self.stats.record_transport_error();
                log::warn!("[{}] template fetch failed: {err:#}", self.miner_id);
                self.batches_since_refresh = 0;
                if self.template.is_none() {
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn adopt(&mut self, tpl: Template) {
        let changed = self
            .template
            .as_ref()
            .is_none_or(|old| old.generation != tpl.generation || old.header != tpl.header);
        if changed {
            // Fresh random base for the new header; batches under the old
            // one are irrelevant now.
            self.base = self.offsets.next_start();
        }
        self.batches_since_refresh = 0;
        self.template = Some(tpl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeApi, test_template};
    use crate::metrics::WorkerStats;

    const IMPOSSIBLE_BITS: u32 = 64;

    fn engine(api: Arc<FakeApi>, batch_size: u64, refresh_batches: u64) -> BatchSearchEngine<Arc<FakeApi>> {
        BatchSearchEngine::new(
            api,
            "gpu-test",
            batch_size,
            refresh_batches,
            Arc::new(AtomicBool::new(false)),
            Arc::new(WorkerStats::new()),
        )
    }

    #[test]
    fn scan_returns_the_lowest_qualifying_nonce() {
        let tpl = test_template(1, 4);
        // Reference: lowest valid nonce in the range by exhaustive walk.
        let lowest = (0..5000u64)
            .find(|&n| pow::meets_difficulty(&pow::digest(&tpl.header, n), 4))
            .expect("difficulty 4 hits within a few thousand nonces");
        let (tested, hit) = scan_batch(&tpl.header, 4, 0, 5000);
        let (nonce, digest) = hit.expect("scan finds the same hit");
        assert_eq!(nonce, lowest);
        assert_eq!(tested, lowest + 1);
        assert!(pow::meets_difficulty(&digest, 4));
    }

    #[test]
    fn scan_reports_a_dry_range() {
        let tpl = test_template(1, IMPOSSIBLE_BITS);
        let (tested, hit) = scan_batch(&tpl.header, IMPOSSIBLE_BITS, 0, 1000);
        assert_eq!(tested, 1000);
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn dry_batch_refetches_once_and_ranges_never_overlap() {
        let api = FakeApi::new(test_template(1, IMPOSSIBLE_BITS));
        let mut engine = engine(Arc::clone(&api), 1000, 1);

        engine.refetch().await;
        let first_base = engine.base;
        engine.step().await;

        // One refetch after the dry batch, before the next one starts.
        assert_eq!(api.fetch_count(), 2);
        assert_eq!(engine.stats.snapshot().attempts, 1000);
        // Same template, so the base advanced by exactly one batch.
        assert_eq!(engine.base, first_base.wrapping_add(1000));

        engine.step().await;
        assert_eq!(api.fetch_count(), 3);
        assert_eq!(engine.base, first_base.wrapping_add(2000));
    }

    #[tokio::test]
    async fn submits_the_batch_hit_and_adopts_the_next_template() {
        let api = FakeApi::new(test_template(1, 0));
        api.push_template(test_template(2, IMPOSSIBLE_BITS));
        let mut engine = engine(Arc::clone(&api), 1000, 0);

        engine.refetch().await;
        let base = engine.base;
        engine.step().await;

        let submissions = api.submissions.lock().unwrap().clone();
        // Difficulty 0: the very first nonce of the batch qualifies and is
        // the lowest.
        assert_eq!(submissions, vec![(1, base)]);
        assert_eq!(engine.template.as_ref().map(|t| t.generation), Some(2));
        assert_eq!(engine.stats.snapshot().accepted, 1);
    }

    #[tokio::test]
    async fn refresh_zero_keeps_scanning_without_fetching() {
        let api = FakeApi::new(test_template(1, IMPOSSIBLE_BITS));
        let mut engine = engine(Arc::clone(&api), 500, 0);

        engine.refetch().await;
        for _ in 0..4 {
            engine.step().await;
        }

        assert_eq!(api.fetch_count(), 1);
        assert_eq!(engine.stats.snapshot().attempts, 2000);
    }
}
