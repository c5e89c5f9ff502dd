use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;

use crate::metrics::WorkerStats;
use crate::offset::OffsetStream;
use crate::pow;
use crate::types::{SubmitStatus, Template};

/// The one capability a worker needs from the coordinator. Implemented by
/// the HTTP client and by the in-process coordinator; the coordinator never
/// learns which engine produced a submission.
pub trait CoordinatorApi {
    /// Fetch the current template, reporting attempts performed since the
    /// previous successful fetch.
    fn fetch_template(&self, attempts: u64) -> impl Future<Output = Result<Template>> + Send;

    fn submit(&self, generation: u64, nonce: u64) -> impl Future<Output = Result<SubmitStatus>> + Send;
}

/// Attempts tested between control checks (stop flag, refresh bookkeeping).
const PROBE_CHUNK: u64 = 4096;

const FETCH_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Sequential searcher: walks successive nonces from a per-worker start
/// offset. The cursor only moves forward within a header, so no nonce is
/// ever retested against the same generation.
pub struct SearchEngine<C: CoordinatorApi> {
    api: C,
    miner_id: String,
    refresh_attempts: u64,
    stop: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    offsets: OffsetStream,
    template: Option<Template>,
    cursor: u64,
    attempts_since_refresh: u64,
    unreported_attempts: u64,
}

impl<C: CoordinatorApi> SearchEngine<C> {
    /// `refresh_attempts = 0` disables proactive refresh; staleness is then
    /// only observed through submission feedback.
    pub fn new(
        api: C,
        miner_id: &str,
        refresh_attempts: u64,
        stop: Arc<AtomicBool>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            api,
            miner_id: miner_id.to_string(),
            refresh_attempts,
            stop,
            stats,
            offsets: OffsetStream::new(miner_id),
            template: None,
            cursor: 0,
            attempts_since_refresh: 0,
            unreported_attempts: 0,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        while !self.stop.load(Ordering::Relaxed) {
            self.step().await;
        }
        log::info!("[{}] search loop stopped", self.miner_id);
        Ok(())
    }

    async fn step(&mut self) {
        let Some(tpl) = self.template.clone() else {
            return self.refetch().await;
        };

        let budget = if self.refresh_attempts > 0 {
            PROBE_CHUNK.min(self.refresh_attempts.saturating_sub(self.attempts_since_refresh))
        } else {
            PROBE_CHUNK
        };

        let mut found = None;
        let mut tested = 0u64;
        for _ in 0..budget {
            let nonce = self.cursor;
            self.cursor = self.cursor.wrapping_add(1);
            tested += 1;
            if pow::meets_difficulty(&pow::digest(&tpl.header, nonce), tpl.difficulty_bits) {
                found = Some(nonce);
                break;
            }
        }
        self.attempts_since_refresh += tested;
        self.unreported_attempts += tested;
        self.stats.record_attempts(tested);

        if let Some(nonce) = found {
            self.stats.record_solution_found();
            self.submit_and_handle(tpl.generation, nonce).await;
        } else if self.refresh_attempts > 0 && self.attempts_since_refresh >= self.refresh_attempts {
            // Bound wasted work against a header that may already be stale.
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
                // The header changed between the local check and arbitration;
                // same recovery as staleness.
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
                self.attempts_since_refresh = 0;
                if self.template.is_none() {
                    tokio::time::sleep(FETCH_RETRY_PAUSE).await;
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
            // Fresh region of the nonce space for the new header.
            self.cursor = self.offsets.next_start();
        }
        self.attempts_since_refresh = 0;
        self.template = Some(tpl);
    }
}
