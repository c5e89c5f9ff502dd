use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::types::{GenerationLogEntry, MinerRecord, Role, StatsSnapshot};

/// Per-miner activity records plus the append-only generation log. Records
/// are created on first contact and live for the whole run; all mutation goes
/// through `touch`/`record_win` so the locks stay short.
pub struct MinerRegistry {
    records: Mutex<HashMap<String, MinerRecord>>,
    log: Mutex<Vec<GenerationLogEntry>>,
    recent_limit: usize,
}

impl MinerRegistry {
    pub fn new(recent_limit: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            recent_limit,
        }
    }

    /// Upsert a record: advance the self-reported attempt count and stamp
    /// `last_seen`. Called on every identified template poll and submission.
    pub fn touch(&self, miner_id: &str, role: Role, attempts_delta: u64) {
        let mut records = lock(&self.records);
        let record = records
            .entry(miner_id.to_string())
            .or_insert_with(|| fresh_record(miner_id, role));
        record.role = role;
        record.total_attempts += attempts_delta;
        record.last_seen = Utc::now();
    }

    /// Credit a generation win and append the log entry. A winner that never
    /// polled gets a fresh record; its role is corrected on its next poll.
    pub fn record_win(&self, miner_id: &str, generation: u64) {
        {
            let mut records = lock(&self.records);
            let record = records
                .entry(miner_id.to_string())
                .or_insert_with(|| fresh_record(miner_id, Role::Sequential));
            record.accepted_solutions += 1;
            record.last_seen = Utc::now();
        }
        lock(&self.log).push(GenerationLogEntry {
            generation,
            winning_miner_id: miner_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn snapshot(&self, current_generation: u64, difficulty_bits: u32) -> StatsSnapshot {
        let mut records: Vec<MinerRecord> = lock(&self.records).values().cloned().collect();
        records.sort_by(|a, b| a.miner_id.cmp(&b.miner_id));

        let log = lock(&self.log);
        let generations_closed = log.len() as u64;
        let recent_log_entries = log[log.len().saturating_sub(self.recent_limit)..].to_vec();

        StatsSnapshot {
            records,
            current_generation,
            difficulty_bits,
            generations_closed,
            recent_log_entries,
        }
    }
}

fn fresh_record(miner_id: &str, role: Role) -> MinerRecord {
    MinerRecord {
        miner_id: miner_id.to_string(),
        role,
        total_attempts: 0,
        accepted_solutions: 0,
        last_seen: Utc::now(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_creates_then_accumulates() {
        let registry = MinerRegistry::new(16);
        registry.touch("cpu-1", Role::Sequential, 100);
        registry.touch("cpu-1", Role::Sequential, 50);
        let snap = registry.snapshot(1, 8);
        assert_eq!(snap.records.len(), 1);
        assert_eq!(snap.records[0].total_attempts, 150);
        assert_eq!(snap.records[0].accepted_solutions, 0);
    }

    #[test]
    fn record_win_credits_and_logs() {
        let registry = MinerRegistry::new(16);
        registry.touch("gpu-1", Role::Batch, 1000);
        registry.record_win("gpu-1", 3);
        let snap = registry.snapshot(4, 8);
        assert_eq!(snap.records[0].accepted_solutions, 1);
        assert_eq!(snap.generations_closed, 1);
        assert_eq!(snap.recent_log_entries[0].generation, 3);
        assert_eq!(snap.recent_log_entries[0].winning_miner_id, "gpu-1");
    }

    #[test]
    fn snapshot_bounds_the_recent_log_window() {
        let registry = MinerRegistry::new(4);
        for generation in 1..=10 {
            registry.record_win("cpu-1", generation);
        }
        let snap = registry.snapshot(11, 8);
        assert_eq!(snap.generations_closed, 10);
        assert_eq!(snap.recent_log_entries.len(), 4);
        assert_eq!(snap.recent_log_entries.first().map(|e| e.generation), Some(7));
        assert_eq!(snap.recent_log_entries.last().map(|e| e.generation), Some(10));
    }

    #[test]
    fn records_sort_by_miner_id() {
        let registry = MinerRegistry::new(16);
        registry.touch("b", Role::Sequential, 1);
        registry.touch("a", Role::Batch, 1);
        let snap = registry.snapshot(1, 8);
        let ids: Vec<&str> = snap.records.iter().map(|r| r.miner_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
