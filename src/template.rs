use std::sync::{Arc, Mutex};

use rand::RngCore;

use crate::pow;
use crate::types::Template;

/// Sole owner of the current template and the generation counter. All reads
/// go through `current()`; the generation only ever moves forward.
pub struct TemplateManager {
    difficulty_bits: u32,
    run_seed: [u8; 32],
    current: Mutex<Arc<Template>>,
}

impl TemplateManager {
    pub fn new(difficulty_bits: u32) -> Self {
        let mut run_seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut run_seed);
        let first = build_template(&run_seed, difficulty_bits, 1);
        Self {
            difficulty_bits,
            run_seed,
            current: Mutex::new(first),
        }
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    /// Immutable snapshot of the current template. The Arc swap under the
    /// mutex guarantees a reader never sees a mismatched (generation, header)
    /// pair.
    pub fn current(&self) -> Arc<Template> {
        Arc::clone(&self.lock())
    }

    /// Unconditionally install the next template.
    pub fn advance(&self) -> Arc<Template> {
        let mut current = self.lock();
        let next = self.build(current.generation + 1);
        *current = Arc::clone(&next);
        next
    }

    /// Close generation `generation` and advance, as one atomic step. Returns
    /// the new template, or `None` if that generation is no longer current —
    /// some other submission already closed it. Replacing the template is what
    /// closes a generation; the counter only moves forward, so a closed
    /// generation can never reopen and at most one caller wins this race.
    pub fn close_and_advance(&self, generation: u64) -> Option<Arc<Template>> {
        let mut current = self.lock();
        if current.generation != generation {
            return None;
        }
        let next = self.build(generation + 1);
        *current = Arc::clone(&next);
        Some(next)
    }

    fn build(&self, generation: u64) -> Arc<Template> {
        build_template(&self.run_seed, self.difficulty_bits, generation)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arc<Template>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn build_template(run_seed: &[u8; 32], difficulty_bits: u32, generation: u64) -> Arc<Template> {
    // Header seed mixes the monotonic generation into per-run entropy, so
    // headers are unique across the run and unpredictable across runs.
    let mut hasher = blake3::Hasher::new();
    hasher.update(run_seed);
    hasher.update(&generation.to_le_bytes());
    let seed: [u8; 32] = hasher.finalize().into();
    Arc::new(Template {
        generation,
        header: pow::make_header(generation, &seed),
        difficulty_bits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn starts_at_generation_one_with_full_header() {
        let manager = TemplateManager::new(18);
        let tpl = manager.current();
        assert_eq!(tpl.generation, 1);
        assert_eq!(tpl.header.len(), pow::HEADER_LEN);
        assert_eq!(tpl.difficulty_bits, 18);
    }

    #[test]
    fn advance_is_monotonic_with_distinct_headers() {
        let manager = TemplateManager::new(8);
        let mut headers = HashSet::new();
        let mut last_generation = 0;
        for _ in 0..32 {
            let tpl = manager.advance();
            assert!(tpl.generation > last_generation);
            last_generation = tpl.generation;
            assert!(headers.insert(tpl.header.clone()), "header reused");
        }
    }

    #[test]
    fn close_and_advance_succeeds_exactly_once_per_generation() {
        let manager = TemplateManager::new(8);
        let generation = manager.current().generation;
        let next = manager.close_and_advance(generation).expect("first close wins");
        assert_eq!(next.generation, generation + 1);
        assert!(manager.close_and_advance(generation).is_none());
    }

    #[test]
    fn concurrent_closes_have_a_single_winner() {
        let manager = Arc::new(TemplateManager::new(8));
        let generation = manager.current().generation;
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager.close_and_advance(generation).is_some()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(manager.current().generation, generation + 1);
    }
}
