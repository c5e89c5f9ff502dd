use std::sync::Arc;

use crate::pow;
use crate::registry::MinerRegistry;
use crate::template::TemplateManager;
use crate::types::SubmitStatus;

/// Arbitrates submissions against the current template. The digest is
/// computed outside any lock; `close_and_advance` is the single atomic step
/// that decides the winner, so two concurrently valid submissions for the
/// same generation can never both be accepted.
pub struct SubmissionValidator {
    templates: Arc<TemplateManager>,
    registry: Arc<MinerRegistry>,
}

impl SubmissionValidator {
    pub fn new(templates: Arc<TemplateManager>, registry: Arc<MinerRegistry>) -> Self {
        Self { templates, registry }
    }

    pub fn submit(&self, generation: u64, miner_id: &str, nonce: u64) -> SubmitStatus {
        let current = self.templates.current();
        if generation != current.generation {
            log::debug!(
                "stale submission from {miner_id}: generation {generation}, current {}",
                current.generation
            );
            return SubmitStatus::RejectedStale;
        }

        let digest = pow::digest(&current.header, nonce);
        if !pow::meets_difficulty(&digest, current.difficulty_bits) {
            log::debug!(
                "invalid submission from {miner_id}: nonce {nonce} has {} leading zero bits, need {}",
                pow::leading_zero_bits(&digest),
                current.difficulty_bits
            );
            return SubmitStatus::RejectedInvalid;
        }

        match self.templates.close_and_advance(generation) {
            Some(next) => {
                self.registry.record_win(miner_id, generation);
                log::info!(
                    "generation {generation} won by {miner_id} (nonce {nonce}, digest {}…), now at {}",
                    &hex::encode(digest)[..16],
                    next.generation
                );
                SubmitStatus::Accepted
            }
            // Valid digest, but another submission closed this generation
            // first; at most one winner takes precedence.
            None => {
                log::debug!("{miner_id} lost the close race for generation {generation}");
                SubmitStatus::RejectedStale
            }
        }
    }
}
